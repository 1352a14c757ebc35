use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{call, AppState};
use crate::services::shell::{AuthMode, Section, ShellRequest};

#[derive(Deserialize)]
pub struct SectionForm {
    section: Section,
}

#[derive(Deserialize)]
pub struct AuthForm {
    mode: AuthMode,
}

pub async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.shell_channel, |response| ShellRequest::State { response })
        .await
        .map(|shell| (StatusCode::OK, Json(json!(shell))))
}

pub async fn navigate(
    State(state): State<AppState>,
    Json(form): Json<SectionForm>,
) -> impl IntoResponse {
    call(&state.shell_channel, |response| ShellRequest::Navigate {
        section: form.section,
        response,
    })
    .await
    .map(|shell| (StatusCode::OK, Json(json!(shell))))
}

pub async fn show_auth(
    State(state): State<AppState>,
    Json(form): Json<AuthForm>,
) -> impl IntoResponse {
    call(&state.shell_channel, |response| ShellRequest::ShowAuth {
        mode: form.mode,
        response,
    })
    .await
    .map(|shell| (StatusCode::OK, Json(json!(shell))))
}

/// Entry point for shared links such as `/landing?ref=alice`.
pub async fn landing(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> impl IntoResponse {
    let url = format!("{}{}", state.origin.trim_end_matches('/'), uri);

    call(&state.shell_channel, |response| ShellRequest::Landing { url, response })
        .await
        .map(|outcome| (StatusCode::OK, Json(json!(outcome))))
}
