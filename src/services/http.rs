use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::auth::AuthRequest;
use super::dashboard::DashboardRequest;
use super::monitor::{Clock, MonitorEvent};
use super::packages::PackageRequest;
use super::profiles::ProfileRequest;
use super::referrals::ReferralRequest;
use super::shell::ShellRequest;
use super::withdrawals::WithdrawalRequest;
use super::ServiceError;
use crate::repositories::realtime::RealtimeFeed;

mod auth;
mod dashboard;
mod packages;
mod profiles;
mod referrals;
mod shell;
mod withdrawals;

#[derive(Clone)]
pub struct AppState {
    pub auth_channel: mpsc::Sender<AuthRequest>,
    pub dashboard_channel: mpsc::Sender<DashboardRequest>,
    pub package_channel: mpsc::Sender<PackageRequest>,
    pub profile_channel: mpsc::Sender<ProfileRequest>,
    pub referral_channel: mpsc::Sender<ReferralRequest>,
    pub shell_channel: mpsc::Sender<ShellRequest>,
    pub withdrawal_channel: mpsc::Sender<WithdrawalRequest>,
    pub table_changes: RealtimeFeed,
    pub monitor_events: broadcast::Sender<MonitorEvent>,
    pub maturation: chrono::Duration,
    pub clock: Arc<dyn Clock>,
    pub origin: String,
    pub upload_limit: usize,
}

pub type ErrorResponse = (StatusCode, Json<Value>);

pub fn error_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::Validation(_) | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::InvalidCredentials | ServiceError::Unauthenticated => {
            StatusCode::UNAUTHORIZED
        }
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::UsernameTaken | ServiceError::EmailTaken => StatusCode::CONFLICT,
        ServiceError::Backend(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: ServiceError) -> ErrorResponse {
    let status = error_status(&error);

    let description = match &error {
        ServiceError::Internal(e) => {
            log::error!("Internal error: {}", e);
            "Internal server error.".to_string()
        }
        ServiceError::Backend(_) => {
            log::error!("{}", error);
            error.to_string()
        }
        _ => error.to_string(),
    };

    (status, Json(json!({ "description": description })))
}

/// Sends one request to a service and waits for its answer.
pub async fn call<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ErrorResponse>
where
    R: Send + 'static,
{
    let (response_tx, response_rx) = oneshot::channel();

    if let Err(e) = channel.send(request(response_tx)).await {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"description": format!("Failed to process request: {}", e)})),
        ));
    }

    match response_rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(service_error)) => Err(error_response(service_error)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"description": format!("Failed to receive response: {}", e)})),
        )),
    }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/shell", get(shell::get_state))
        .route("/shell/section", put(shell::navigate))
        .route("/shell/auth", put(shell::show_auth))
        .route("/landing", get(shell::landing))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/packages/tiers", get(packages::tiers))
        .route("/packages", get(packages::list).post(packages::purchase))
        .route("/packages/watch", get(packages::watch))
        .route("/packages/{id}", delete(packages::remove))
        .route("/packages/{id}/countdown", get(packages::countdown))
        .route("/yields", get(packages::yields))
        .route("/transactions", get(withdrawals::statement))
        .route("/withdrawals/bonus", post(withdrawals::bonus))
        .route("/withdrawals/yield", post(withdrawals::yield_withdrawal))
        .route("/referrals", get(referrals::list))
        .route("/referrals/link", get(referrals::link))
        .route(
            "/profile",
            get(profiles::get_profile).put(profiles::save_profile),
        )
        .route(
            "/profile/avatar",
            post(profiles::upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/profile/wallet",
            get(profiles::get_wallet).put(profiles::save_wallet),
        )
        .route("/profile/pin", get(profiles::pin_status).put(profiles::save_pin))
        .route("/stats", get(dashboard::stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(state: AppState, listen: &str) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::backend::{BackendError, BackendErrorKind};
    use crate::validation::ValidationError;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                ServiceError::Validation(ValidationError::WalletRequired),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::BadRequest("bad url".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (ServiceError::UsernameTaken, StatusCode::CONFLICT),
            (ServiceError::EmailTaken, StatusCode::CONFLICT),
            (
                BackendError::new(BackendErrorKind::Network, "offline").into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ServiceError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error_status(&error), status);
        }
    }

    #[test]
    fn backend_kinds_map_to_user_meanings() {
        let unauthorized: ServiceError =
            BackendError::new(BackendErrorKind::Unauthorized, "jwt expired").into();
        assert!(matches!(unauthorized, ServiceError::Unauthenticated));

        let taken = ServiceError::from_profile_write(BackendError::new(
            BackendErrorKind::UniqueViolation,
            "duplicate key",
        ));
        assert!(matches!(taken, ServiceError::UsernameTaken));
    }

    #[test]
    fn internal_errors_hide_details() {
        let (status, Json(body)) = error_response(ServiceError::Internal("secret".to_string()));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "description": "Internal server error." }));
    }

    #[test]
    fn validation_message_is_the_description() {
        let (status, Json(body)) =
            error_response(ValidationError::WalletRequired.into());

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["description"],
            ValidationError::WalletRequired.to_string()
        );
    }
}
