use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{call, AppState};
use crate::models::session::{SignInForm, SignUpForm};
use crate::services::auth::AuthRequest;

pub async fn sign_in(
    State(state): State<AppState>,
    Json(form): Json<SignInForm>,
) -> impl IntoResponse {
    call(&state.auth_channel, |response| AuthRequest::SignIn { form, response })
        .await
        .map(|user| (StatusCode::OK, Json(json!(user))))
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(form): Json<SignUpForm>,
) -> impl IntoResponse {
    call(&state.auth_channel, |response| AuthRequest::SignUp { form, response })
        .await
        .map(|user| (StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.auth_channel, |response| AuthRequest::SignOut { response })
        .await
        .map(|_| StatusCode::NO_CONTENT)
}
