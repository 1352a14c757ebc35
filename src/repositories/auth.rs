use async_trait::async_trait;
use serde_json::{json, Value};

use super::backend::{error_from_response, BackendError, BackendErrorKind, BackendResult};
use crate::models::session::{AuthUser, Session, SignUpOutcome};

#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
        redirect_to: &str,
    ) -> BackendResult<SignUpOutcome>;

    async fn sign_out(&self, access_token: &str) -> BackendResult<()>;
}

pub struct RestAuth {
    url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl RestAuth {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: Option<&str>,
        payload: Value,
    ) -> BackendResult<Value> {
        let response = self
            .client
            .post(format!("{}/auth/v1/{}", self.url, path))
            .query(query)
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Sign-up answers with a full session, or with the bare user when email
/// confirmation is pending.
pub fn parse_sign_up(value: Value) -> BackendResult<SignUpOutcome> {
    if value.get("access_token").is_some() {
        let session: Session = serde_json::from_value(value)?;
        return Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }

    let user_value = match value.get("user") {
        Some(user) if !user.is_null() => user.clone(),
        _ => value,
    };

    if user_value.get("id").is_none() {
        return Err(BackendError::new(
            BackendErrorKind::Decode,
            "Sign-up response carries no user.",
        ));
    }

    let user: AuthUser = serde_json::from_value(user_value)?;
    Ok(SignUpOutcome {
        user: Some(user),
        session: None,
    })
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let value = self
            .post(
                "token",
                &[("grant_type", "password")],
                None,
                json!({ "email": email, "password": password }),
            )
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
        redirect_to: &str,
    ) -> BackendResult<SignUpOutcome> {
        let value = self
            .post(
                "signup",
                &[("redirect_to", redirect_to)],
                None,
                json!({ "email": email, "password": password, "data": metadata }),
            )
            .await?;

        parse_sign_up(value)
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        self.post("logout", &[], Some(access_token), json!({}))
            .await
            .map(|_| ())
    }
}
