use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{call, AppState};
use crate::models::transactions::WithdrawalForm;
use crate::services::withdrawals::WithdrawalRequest;

pub async fn statement(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.withdrawal_channel, |response| {
        WithdrawalRequest::Statement { response }
    })
    .await
    .map(|entries| (StatusCode::OK, Json(json!(entries))))
}

pub async fn bonus(
    State(state): State<AppState>,
    Json(form): Json<WithdrawalForm>,
) -> impl IntoResponse {
    call(&state.withdrawal_channel, |response| WithdrawalRequest::Bonus {
        form,
        response,
    })
    .await
    .map(|transaction| (StatusCode::CREATED, Json(json!(transaction))))
}

pub async fn yield_withdrawal(
    State(state): State<AppState>,
    Json(form): Json<WithdrawalForm>,
) -> impl IntoResponse {
    call(&state.withdrawal_channel, |response| WithdrawalRequest::Yield {
        form,
        response,
    })
    .await
    .map(|transaction| (StatusCode::CREATED, Json(json!(transaction))))
}
