use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{call, AppState};
use crate::services::referrals::ReferralRequest;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.referral_channel, |response| ReferralRequest::List { response })
        .await
        .map(|summary| (StatusCode::OK, Json(json!(summary))))
}

pub async fn link(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.referral_channel, |response| ReferralRequest::Link { response })
        .await
        .map(|link| (StatusCode::OK, Json(json!(link))))
}
