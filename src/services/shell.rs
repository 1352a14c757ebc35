use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;

use super::monitor::{MonitorContext, PackageMonitor};
use super::{RequestHandler, Service, ServiceError};
use crate::local_store::{LocalStore, REFERRAL_CODE_KEY};
use crate::models::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Dashboard,
    BuyPackage,
    MyPackages,
    Referrals,
    Statement,
    Withdrawals,
    WithdrawalData,
    WithdrawalPin,
    Profile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    SignIn,
    Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Landing,
    Auth { mode: AuthMode },
    Dashboard { section: Section },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShellState {
    pub view: View,
    pub user_id: Option<String>,
    pub monitoring: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LandingOutcome {
    pub view: View,
    /// The entry URL without its query string.
    pub url: String,
    pub referral_code: Option<String>,
}

pub enum ShellRequest {
    State {
        response: oneshot::Sender<Result<ShellState, ServiceError>>,
    },
    Navigate {
        section: Section,
        response: oneshot::Sender<Result<ShellState, ServiceError>>,
    },
    ShowAuth {
        mode: AuthMode,
        response: oneshot::Sender<Result<ShellState, ServiceError>>,
    },
    Landing {
        url: String,
        response: oneshot::Sender<Result<LandingOutcome, ServiceError>>,
    },
}

struct Mounted {
    user_id: String,
    monitor: PackageMonitor,
    task: JoinHandle<()>,
}

struct ShellInner {
    view: View,
    mounted: Option<Mounted>,
}

impl ShellInner {
    fn snapshot(&self) -> ShellState {
        ShellState {
            view: self.view,
            user_id: self.mounted.as_ref().map(|m| m.user_id.clone()),
            monitoring: self
                .mounted
                .as_ref()
                .map(|m| !m.task.is_finished())
                .unwrap_or(false),
        }
    }

    fn unmount(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.monitor.stop();
            log::info!("Package monitor unmounted for user {}.", mounted.user_id);
        }
    }
}

/// Navigation state plus the session-scoped package monitor.
#[derive(Clone)]
pub struct ShellRequestHandler {
    inner: Arc<RwLock<ShellInner>>,
    monitors: MonitorContext,
    store: Arc<LocalStore>,
}

impl ShellRequestHandler {
    pub fn new(monitors: MonitorContext, store: Arc<LocalStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ShellInner {
                view: View::Landing,
                mounted: None,
            })),
            monitors,
            store,
        }
    }

    /// Applies every session change until the session channel closes.
    pub async fn follow_session(&self, mut session: watch::Receiver<Option<Session>>) {
        loop {
            let current = session.borrow_and_update().clone();
            self.apply_session(current.as_ref()).await;

            if session.changed().await.is_err() {
                break;
            }
        }

        self.inner.write().await.unmount();
    }

    pub async fn apply_session(&self, session: Option<&Session>) {
        let mut inner = self.inner.write().await;

        match session {
            Some(session) => {
                let already_mounted = inner
                    .mounted
                    .as_ref()
                    .map(|m| m.user_id == session.user.id)
                    .unwrap_or(false);
                if already_mounted {
                    return;
                }

                inner.unmount();
                let monitor = self.monitors.monitor_for(&session.user.id);
                let task = monitor.start();
                inner.mounted = Some(Mounted {
                    user_id: session.user.id.clone(),
                    monitor,
                    task,
                });
                inner.view = View::Dashboard {
                    section: Section::Dashboard,
                };
            }
            None => {
                let was_signed_in = inner.mounted.is_some();
                inner.unmount();
                if was_signed_in || matches!(inner.view, View::Dashboard { .. }) {
                    inner.view = View::Landing;
                }
            }
        }
    }

    async fn state(&self) -> ShellState {
        self.inner.read().await.snapshot()
    }

    async fn navigate(&self, section: Section) -> Result<ShellState, ServiceError> {
        let mut inner = self.inner.write().await;
        if inner.mounted.is_none() {
            return Err(ServiceError::Unauthenticated);
        }

        inner.view = View::Dashboard { section };
        Ok(inner.snapshot())
    }

    async fn show_auth(&self, mode: AuthMode) -> Result<ShellState, ServiceError> {
        let mut inner = self.inner.write().await;
        if inner.mounted.is_none() {
            inner.view = View::Auth { mode };
        }

        Ok(inner.snapshot())
    }

    /// Captures `ref=<username>` from the entry URL.
    async fn landing(&self, url: &str) -> Result<LandingOutcome, ServiceError> {
        let mut url = Url::parse(url)
            .map_err(|e| ServiceError::BadRequest(format!("Invalid entry URL: {}", e)))?;

        let referral_code = url
            .query_pairs()
            .find(|(key, _)| key == "ref")
            .map(|(_, value)| value.trim().to_string())
            .filter(|code| !code.is_empty());
        url.set_query(None);

        let mut inner = self.inner.write().await;
        if let Some(code) = &referral_code {
            self.store
                .set(REFERRAL_CODE_KEY, code)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            log::info!("Referral code {} captured.", code);

            if inner.mounted.is_none() {
                inner.view = View::Auth {
                    mode: AuthMode::Register,
                };
            }
        }

        Ok(LandingOutcome {
            view: inner.view,
            url: url.to_string(),
            referral_code,
        })
    }
}

#[async_trait]
impl RequestHandler<ShellRequest> for ShellRequestHandler {
    async fn handle_request(&self, request: ShellRequest) {
        match request {
            ShellRequest::State { response } => {
                let _ = response.send(Ok(self.state().await));
            }
            ShellRequest::Navigate { section, response } => {
                let _ = response.send(self.navigate(section).await);
            }
            ShellRequest::ShowAuth { mode, response } => {
                let _ = response.send(self.show_auth(mode).await);
            }
            ShellRequest::Landing { url, response } => {
                let _ = response.send(self.landing(&url).await);
            }
        }
    }
}

pub struct ShellService;

impl ShellService {
    pub fn new() -> Self {
        ShellService {}
    }
}

#[async_trait]
impl Service<ShellRequest, ShellRequestHandler> for ShellService {}
