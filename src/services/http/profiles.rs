use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{call, AppState};
use crate::models::profiles::{PinForm, ProfileForm, WalletForm};
use crate::services::profiles::ProfileRequest;

pub async fn get_profile(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::Get { response })
        .await
        .map(|profile| (StatusCode::OK, Json(json!(profile))))
}

pub async fn save_profile(
    State(state): State<AppState>,
    Json(form): Json<ProfileForm>,
) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::Save { form, response })
        .await
        .map(|profile| (StatusCode::OK, Json(json!(profile))))
}

/// Raw image body. The original file name, if any, comes in `x-file-name`.
pub async fn upload_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let file_name = headers
        .get("x-file-name")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    call(&state.profile_channel, |response| ProfileRequest::UploadAvatar {
        content_type,
        file_name,
        bytes: body.to_vec(),
        response,
    })
    .await
    .map(|upload| (StatusCode::CREATED, Json(json!(upload))))
}

pub async fn get_wallet(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::GetWallet { response })
        .await
        .map(|wallet| (StatusCode::OK, Json(json!(wallet))))
}

pub async fn save_wallet(
    State(state): State<AppState>,
    Json(form): Json<WalletForm>,
) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::SaveWallet {
        form,
        response,
    })
    .await
    .map(|wallet| (StatusCode::OK, Json(json!(wallet))))
}

pub async fn pin_status(State(state): State<AppState>) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::PinStatus { response })
        .await
        .map(|status| (StatusCode::OK, Json(json!(status))))
}

pub async fn save_pin(
    State(state): State<AppState>,
    Json(form): Json<PinForm>,
) -> impl IntoResponse {
    call(&state.profile_channel, |response| ProfileRequest::SavePin { form, response })
        .await
        .map(|status| (StatusCode::OK, Json(json!(status))))
}
