use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use crate::local_store::LocalStore;
use crate::models::session::{AuthUser, Session};
use crate::repositories::auth::RestAuth;
use crate::repositories::backend::{Backend, BackendError, BackendErrorKind, RestBackend, Table};
use crate::repositories::packages::PackageRepository;
use crate::repositories::profiles::ProfileRepository;
use crate::repositories::realtime::RealtimeFeed;
use crate::repositories::referrals::ReferralRepository;
use crate::repositories::storage::{ObjectStorage, RestStorage};
use crate::repositories::transactions::TransactionRepository;
use crate::repositories::yields::YieldRepository;
use crate::settings::Settings;
use crate::validation::ValidationError;

mod auth;
mod confirmations;
mod dashboard;
mod http;
mod monitor;
mod packages;
mod profiles;
mod referrals;
mod shell;
mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("This username is already taken.")]
    UsernameTaken,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("This email is already registered.")]
    EmailTaken,
    #[error("You need to sign in first.")]
    Unauthenticated,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(BackendError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for ServiceError {
    fn from(e: BackendError) -> Self {
        match e.kind {
            BackendErrorKind::Unauthorized => ServiceError::Unauthenticated,
            BackendErrorKind::NotFound => ServiceError::NotFound(e.message),
            _ => ServiceError::Backend(e),
        }
    }
}

impl ServiceError {
    /// Profile writes only conflict on the unique username.
    pub fn from_profile_write(e: BackendError) -> Self {
        if e.is(BackendErrorKind::UniqueViolation) {
            return ServiceError::UsernameTaken;
        }

        e.into()
    }
}

pub(crate) fn current_user(
    session: &watch::Receiver<Option<Session>>,
) -> Result<AuthUser, ServiceError> {
    session
        .borrow()
        .as_ref()
        .map(|s| s.user.clone())
        .ok_or(ServiceError::Unauthenticated)
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use chrono::{DateTime, Utc};

    use super::monitor::Clock;
    use crate::models::session::{AuthUser, Session};

    pub fn session_for(user_id: &str) -> Session {
        Session {
            access_token: format!("token-{}", user_id),
            refresh_token: None,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(format!("{}@example.com", user_id)),
            },
        }
    }

    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}

pub async fn start_services(settings: Settings, listen: String) -> Result<(), anyhow::Error> {
    let (session_tx, session_rx) = watch::channel::<Option<Session>>(None);
    let session_tx = Arc::new(session_tx);

    let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(
        &settings.backend.url,
        &settings.backend.anon_key,
        session_rx.clone(),
    ));
    let auth_provider = Arc::new(RestAuth::new(
        &settings.backend.url,
        &settings.backend.anon_key,
    ));
    let storage: Arc<dyn ObjectStorage> = Arc::new(RestStorage::new(
        &settings.backend.url,
        &settings.backend.anon_key,
        session_rx.clone(),
    ));
    let store = Arc::new(LocalStore::open(settings.local.data_dir.as_deref())?);
    let clock: Arc<dyn monitor::Clock> = Arc::new(monitor::SystemClock);

    let bucket = profiles::avatar_bucket_spec(
        &settings.storage.avatar_bucket,
        settings.storage.max_avatar_bytes,
    );
    if let Err(e) = profiles::provision_bucket(storage.as_ref(), &bucket).await {
        log::error!("Could not provision storage bucket {}: {}", bucket.name, e);
    }

    let package_repository = PackageRepository::new(backend.clone());
    let yield_repository = YieldRepository::new(backend.clone());
    let transaction_repository = TransactionRepository::new(backend.clone());
    let profile_repository = ProfileRepository::new(backend.clone());
    let referral_repository = ReferralRepository::new(backend.clone());

    let (auth_tx, mut auth_rx) = mpsc::channel(512);
    let (dashboard_tx, mut dashboard_rx) = mpsc::channel(512);
    let (package_tx, mut package_rx) = mpsc::channel(512);
    let (profile_tx, mut profile_rx) = mpsc::channel(512);
    let (referral_tx, mut referral_rx) = mpsc::channel(512);
    let (shell_tx, mut shell_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);

    let mut auth_service = auth::AuthService::new();
    let mut dashboard_service = dashboard::DashboardService::new();
    let mut package_service = packages::PackageService::new();
    let mut profile_service = profiles::ProfileService::new();
    let mut referral_service = referrals::ReferralService::new();
    let mut shell_service = shell::ShellService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();

    log::info!("Starting auth service.");
    let resolver = referrals::ReferralResolver::new(
        profile_repository.clone(),
        referral_repository.clone(),
        store.clone(),
    );
    let auth_handler = auth::AuthRequestHandler::new(
        auth_provider,
        session_tx.clone(),
        resolver,
        settings.site.origin.clone(),
    );
    tokio::spawn(async move {
        auth_service.run(auth_handler, &mut auth_rx).await;
    });

    log::info!("Starting dashboard service.");
    let dashboard_handler = dashboard::DashboardRequestHandler::new(
        session_rx.clone(),
        yield_repository.clone(),
        referral_repository.clone(),
        transaction_repository.clone(),
    );
    tokio::spawn(async move {
        dashboard_service
            .run(dashboard_handler, &mut dashboard_rx)
            .await;
    });

    log::info!("Starting package service.");
    let maturation = settings.packages.maturation_window();
    let package_handler = packages::PackageRequestHandler::new(
        session_rx.clone(),
        package_repository.clone(),
        yield_repository,
        clock.clone(),
        maturation,
    );
    tokio::spawn(async move {
        package_service.run(package_handler, &mut package_rx).await;
    });

    log::info!("Starting profile service.");
    let profile_handler = profiles::ProfileRequestHandler::new(
        session_rx.clone(),
        profile_repository.clone(),
        storage,
        clock.clone(),
        settings.storage.avatar_bucket.clone(),
        settings.storage.max_avatar_bytes,
    );
    tokio::spawn(async move {
        profile_service.run(profile_handler, &mut profile_rx).await;
    });

    log::info!("Starting referral service.");
    let referral_handler = referrals::ReferralRequestHandler::new(
        session_rx.clone(),
        profile_repository,
        referral_repository,
        clock.clone(),
        settings.site.origin.clone(),
    );
    tokio::spawn(async move {
        referral_service.run(referral_handler, &mut referral_rx).await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_handler = withdrawals::WithdrawalRequestHandler::new(
        session_rx.clone(),
        transaction_repository,
        package_repository.clone(),
        settings.withdrawals.require_package_for_yield,
    );
    tokio::spawn(async move {
        withdrawal_service
            .run(withdrawal_handler, &mut withdrawal_rx)
            .await;
    });

    log::info!("Starting realtime feed.");
    let feed = RealtimeFeed::new(
        &settings.backend.url,
        &settings.backend.anon_key,
        std::time::Duration::from_secs(settings.realtime.reconnect_secs),
        std::time::Duration::from_secs(settings.realtime.heartbeat_secs),
        session_rx.clone(),
    );
    feed.start(vec![Table::Packages, Table::DailyYields]);

    log::info!("Starting shell service.");
    let (events_tx, _) = broadcast::channel(64);
    let monitors = monitor::MonitorContext {
        repository: package_repository,
        confirmations: confirmations::provider_from_settings(&settings.confirmations)?,
        clock: clock.clone(),
        config: monitor::MonitorConfig::from_settings(&settings),
        events: events_tx.clone(),
    };
    let shell_handler = shell::ShellRequestHandler::new(monitors, store);
    let follower = shell_handler.clone();
    let shell_session_rx = session_rx.clone();
    tokio::spawn(async move {
        follower.follow_session(shell_session_rx).await;
    });
    tokio::spawn(async move {
        shell_service.run(shell_handler, &mut shell_rx).await;
    });

    log::info!("Starting HTTP server.");
    let state = http::AppState {
        auth_channel: auth_tx,
        dashboard_channel: dashboard_tx,
        package_channel: package_tx,
        profile_channel: profile_tx,
        referral_channel: referral_tx,
        shell_channel: shell_tx,
        withdrawal_channel: withdrawal_tx,
        table_changes: feed,
        monitor_events: events_tx,
        maturation,
        clock,
        origin: settings.site.origin.clone(),
        upload_limit: (settings.storage.max_avatar_bytes as usize).saturating_mul(2),
    };

    http::start_http_server(state, &listen).await
}
