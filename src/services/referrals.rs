use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::{oneshot, watch};

use super::monitor::Clock;
use super::{current_user, RequestHandler, Service, ServiceError};
use crate::local_store::{LocalStore, REFERRAL_CODE_KEY};
use crate::models::referrals::{Referral, ReferralEntry, ReferralLink, ReferralSummary};
use crate::models::session::Session;
use crate::repositories::profiles::ProfileRepository;
use crate::repositories::referrals::ReferralRepository;

pub enum ReferralRequest {
    Link {
        response: oneshot::Sender<Result<ReferralLink, ServiceError>>,
    },
    List {
        response: oneshot::Sender<Result<ReferralSummary, ServiceError>>,
    },
}

pub fn referral_link(origin: &str, username: &str) -> Result<String, ServiceError> {
    let mut url = Url::parse(origin)
        .map_err(|e| ServiceError::Internal(format!("Invalid site origin {}: {}", origin, e)))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("ref", username);

    Ok(url.to_string())
}

pub fn placeholder_username(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(8).collect();
    format!("user_{}", prefix)
}

/// Turns a captured referral code into a referral row for a fresh account.
/// The stored code is only cleared once the row exists.
#[derive(Clone)]
pub struct ReferralResolver {
    profiles: ProfileRepository,
    referrals: ReferralRepository,
    store: Arc<LocalStore>,
}

impl ReferralResolver {
    pub fn new(profiles: ProfileRepository, referrals: ReferralRepository, store: Arc<LocalStore>) -> Self {
        Self {
            profiles,
            referrals,
            store,
        }
    }

    pub async fn resolve(&self, referred_id: &str) -> Result<Option<Referral>, ServiceError> {
        let code = match self
            .store
            .get(REFERRAL_CODE_KEY)
            .map_err(|e| ServiceError::Internal(e.to_string()))?
        {
            Some(code) if !code.trim().is_empty() => code.trim().to_string(),
            _ => return Ok(None),
        };

        let referrer = match self.profiles.get_profile_by_username(&code).await? {
            Some(referrer) => referrer,
            None => {
                log::info!("No referrer found for code {}.", code);
                return Ok(None);
            }
        };

        let referral = self
            .referrals
            .insert_referral(&referrer.id, referred_id)
            .await?;
        log::info!("Referral {} created for referrer {}.", referral.id, referrer.id);

        self.store
            .remove(REFERRAL_CODE_KEY)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(Some(referral))
    }
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    session: watch::Receiver<Option<Session>>,
    profiles: ProfileRepository,
    referrals: ReferralRepository,
    clock: Arc<dyn Clock>,
    origin: String,
}

impl ReferralRequestHandler {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        profiles: ProfileRepository,
        referrals: ReferralRepository,
        clock: Arc<dyn Clock>,
        origin: String,
    ) -> Self {
        Self {
            session,
            profiles,
            referrals,
            clock,
            origin,
        }
    }

    async fn link(&self) -> Result<ReferralLink, ServiceError> {
        let user = current_user(&self.session)?;

        let existing = self
            .profiles
            .get_profile(&user.id)
            .await?
            .and_then(|profile| profile.username)
            .filter(|username| !username.trim().is_empty());

        let username = match existing {
            Some(username) => username,
            None => {
                let username = placeholder_username(&user.id);
                self.profiles
                    .set_username(&user.id, &username, user.email.as_deref(), self.clock.now())
                    .await
                    .map_err(ServiceError::from_profile_write)?;
                log::info!("Assigned username {} to user {}.", username, user.id);
                username
            }
        };

        Ok(ReferralLink {
            link: referral_link(&self.origin, &username)?,
            username,
        })
    }

    async fn list(&self) -> Result<ReferralSummary, ServiceError> {
        let user = current_user(&self.session)?;

        let referrals = self.referrals.get_referrals(&user.id).await?;
        let referred_ids: Vec<String> = referrals.iter().map(|r| r.referred_id.clone()).collect();
        let profiles = self.profiles.get_referred_profiles(&referred_ids).await?;

        let total_bonus = referrals.iter().map(|r| r.bonus_amount).sum();
        let referrals = referrals
            .into_iter()
            .map(|referral| ReferralEntry {
                referred_profile: profiles
                    .iter()
                    .find(|p| p.id == referral.referred_id)
                    .cloned(),
                referral,
            })
            .collect();

        Ok(ReferralSummary {
            referrals,
            total_bonus,
        })
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::Link { response } => {
                let _ = response.send(self.link().await);
            }
            ReferralRequest::List { response } => {
                let _ = response.send(self.list().await);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::repositories::backend::{Backend, Table};
    use crate::repositories::memory::MemoryBackend;
    use crate::services::test_support::{session_for, FixedClock};

    fn handler(backend: Arc<MemoryBackend>) -> ReferralRequestHandler {
        let conn = backend as Arc<dyn Backend>;
        let (_tx, session) = watch::channel(Some(session_for("0123456789abcdef")));

        ReferralRequestHandler::new(
            session,
            ProfileRepository::new(conn.clone()),
            ReferralRepository::new(conn),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())),
            "https://example.com".to_string(),
        )
    }

    fn resolver(backend: Arc<MemoryBackend>, store: Arc<LocalStore>) -> ReferralResolver {
        let conn = backend as Arc<dyn Backend>;
        ReferralResolver::new(
            ProfileRepository::new(conn.clone()),
            ReferralRepository::new(conn),
            store,
        )
    }

    #[test]
    fn link_format() {
        assert_eq!(
            referral_link("https://example.com", "alice").unwrap(),
            "https://example.com/?ref=alice"
        );
        assert_eq!(
            referral_link("https://example.com/dashboard?x=1", "alice").unwrap(),
            "https://example.com/?ref=alice"
        );
    }

    #[test]
    fn placeholder_uses_id_prefix() {
        assert_eq!(placeholder_username("0123456789abcdef"), "user_01234567");
        assert_eq!(placeholder_username("abc"), "user_abc");
    }

    #[tokio::test]
    async fn link_uses_existing_username() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::Profiles,
            json!({ "id": "0123456789abcdef", "username": "alice" }),
        );

        let link = handler(backend).link().await.unwrap();

        assert_eq!(link.username, "alice");
        assert_eq!(link.link, "https://example.com/?ref=alice");
    }

    #[tokio::test]
    async fn link_assigns_placeholder_username() {
        let backend = Arc::new(MemoryBackend::new());

        let link = handler(backend.clone()).link().await.unwrap();

        assert_eq!(link.username, "user_01234567");
        assert_eq!(link.link, "https://example.com/?ref=user_01234567");
        assert_eq!(backend.rows(Table::Profiles)[0]["username"], "user_01234567");
    }

    #[tokio::test]
    async fn list_joins_referred_profiles() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::Profiles,
            json!({ "id": "r1", "name": "Bob", "username": "bob" }),
        );
        backend.seed(
            Table::Referrals,
            json!({ "referrer_id": "0123456789abcdef", "referred_id": "r1", "bonus_amount": 10.0 }),
        );
        backend.seed(
            Table::Referrals,
            json!({ "referrer_id": "0123456789abcdef", "referred_id": "r2", "bonus_amount": 10.0 }),
        );
        backend.seed(
            Table::Referrals,
            json!({ "referrer_id": "someone", "referred_id": "r3", "bonus_amount": 10.0 }),
        );

        let summary = handler(backend).list().await.unwrap();

        assert_eq!(summary.referrals.len(), 2);
        assert_eq!(summary.total_bonus, 20.0);
        let bob = summary
            .referrals
            .iter()
            .find(|r| r.referral.referred_id == "r1")
            .unwrap();
        assert_eq!(
            bob.referred_profile.as_ref().and_then(|p| p.username.as_deref()),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn resolution_creates_one_referral_and_clears_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path().to_str()).unwrap());
        store.set(REFERRAL_CODE_KEY, "alice").unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.seed(Table::Profiles, json!({ "id": "ref-id", "username": "alice" }));

        let referral = resolver(backend.clone(), store.clone())
            .resolve("new-user")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(referral.referrer_id, "ref-id");
        assert_eq!(referral.referred_id, "new-user");
        assert_eq!(referral.bonus_amount, 10.0);
        assert_eq!(backend.rows(Table::Referrals).len(), 1);
        assert_eq!(store.get(REFERRAL_CODE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_code_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path().to_str()).unwrap());
        store.set(REFERRAL_CODE_KEY, "nobody").unwrap();
        let backend = Arc::new(MemoryBackend::new());

        let referral = resolver(backend.clone(), store).resolve("new-user").await.unwrap();

        assert!(referral.is_none());
        assert!(backend.rows(Table::Referrals).is_empty());
    }
}
