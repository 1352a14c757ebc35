use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{call, AppState};
use crate::services::dashboard::DashboardRequest;

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.dashboard_channel, |response| DashboardRequest::Stats { response })
        .await
        .map(|stats| (StatusCode::OK, Json(json!(stats))))
}
