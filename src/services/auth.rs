use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{oneshot, watch};

use super::referrals::ReferralResolver;
use super::{RequestHandler, Service, ServiceError};
use crate::models::session::{AuthUser, Session, SignInForm, SignUpForm};
use crate::repositories::auth::AuthProvider;
use crate::repositories::backend::BackendError;
use crate::validation;

pub enum AuthRequest {
    SignIn {
        form: SignInForm,
        response: oneshot::Sender<Result<AuthUser, ServiceError>>,
    },
    SignUp {
        form: SignUpForm,
        response: oneshot::Sender<Result<Option<AuthUser>, ServiceError>>,
    },
    SignOut {
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

fn sign_in_error(e: BackendError) -> ServiceError {
    if e.message.contains("Invalid login credentials") {
        return ServiceError::InvalidCredentials;
    }

    e.into()
}

fn sign_up_error(e: BackendError) -> ServiceError {
    if e.message.contains("already registered") {
        return ServiceError::EmailTaken;
    }

    e.into()
}

#[derive(Clone)]
pub struct AuthRequestHandler {
    provider: Arc<dyn AuthProvider>,
    session: Arc<watch::Sender<Option<Session>>>,
    resolver: ReferralResolver,
    origin: String,
}

impl AuthRequestHandler {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        session: Arc<watch::Sender<Option<Session>>>,
        resolver: ReferralResolver,
        origin: String,
    ) -> Self {
        Self {
            provider,
            session,
            resolver,
            origin,
        }
    }

    async fn sign_in(&self, form: SignInForm) -> Result<AuthUser, ServiceError> {
        validation::sign_in(&form)?;

        let session = self
            .provider
            .sign_in(form.email.trim(), &form.password)
            .await
            .map_err(sign_in_error)?;
        let user = session.user.clone();
        self.session.send_replace(Some(session));
        log::info!("User {} signed in.", user.id);

        Ok(user)
    }

    /// Returns the new user, if the backend reported one. The session only
    /// starts when the backend does not require email confirmation.
    async fn sign_up(&self, form: SignUpForm) -> Result<Option<AuthUser>, ServiceError> {
        validation::sign_up(&form)?;

        let metadata = json!({
            "name": form.name.trim(),
            "username": form.username.trim(),
        });
        let redirect_to = format!("{}/", self.origin.trim_end_matches('/'));

        let outcome = self
            .provider
            .sign_up(form.email.trim(), &form.password, metadata, &redirect_to)
            .await
            .map_err(sign_up_error)?;

        if let Some(session) = outcome.session {
            self.session.send_replace(Some(session));
        }

        if let Some(user) = &outcome.user {
            log::info!("User {} registered.", user.id);

            // registration stands even when the referral cannot be recorded
            if let Err(e) = self.resolver.resolve(&user.id).await {
                log::error!("Could not record referral for {}: {}", user.id, e);
            }
        }

        Ok(outcome.user)
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let previous = self.session.send_replace(None);

        if let Some(session) = previous {
            if let Err(e) = self.provider.sign_out(&session.access_token).await {
                log::warn!("Backend sign-out failed for {}: {}", session.user.id, e);
            }
            log::info!("User {} signed out.", session.user.id);
        }

        Ok(())
    }
}

#[async_trait]
impl RequestHandler<AuthRequest> for AuthRequestHandler {
    async fn handle_request(&self, request: AuthRequest) {
        match request {
            AuthRequest::SignIn { form, response } => {
                let _ = response.send(self.sign_in(form).await);
            }
            AuthRequest::SignUp { form, response } => {
                let _ = response.send(self.sign_up(form).await);
            }
            AuthRequest::SignOut { response } => {
                let _ = response.send(self.sign_out().await);
            }
        }
    }
}

pub struct AuthService;

impl AuthService {
    pub fn new() -> Self {
        AuthService {}
    }
}

#[async_trait]
impl Service<AuthRequest, AuthRequestHandler> for AuthService {}
