use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::backend::{decode_row, decode_rows, Backend, BackendResult, Query, Table};
use crate::models::profiles::{Profile, ProfileForm};
use crate::models::referrals::ReferredProfile;

#[derive(Clone)]
pub struct ProfileRepository {
    conn: Arc<dyn Backend>,
}

impl ProfileRepository {
    pub fn new(conn: Arc<dyn Backend>) -> Self {
        Self { conn }
    }

    pub async fn get_profile(&self, user_id: &str) -> BackendResult<Option<Profile>> {
        let query = Query::new().eq("id", user_id);
        let profiles: Vec<Profile> = decode_rows(self.conn.select(Table::Profiles, &query).await?)?;

        Ok(profiles.into_iter().next())
    }

    pub async fn get_profile_by_username(&self, username: &str) -> BackendResult<Option<Profile>> {
        let query = Query::new().eq("username", username);
        let profiles: Vec<Profile> = decode_rows(self.conn.select(Table::Profiles, &query).await?)?;

        Ok(profiles.into_iter().next())
    }

    pub async fn get_referred_profiles(&self, ids: &[String]) -> BackendResult<Vec<ReferredProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = Query::new()
            .select("id, name, email, username")
            .within("id", ids);

        decode_rows(self.conn.select(Table::Profiles, &query).await?)
    }

    pub async fn save_profile(
        &self,
        user_id: &str,
        form: &ProfileForm,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        self.upsert_fields(
            user_id,
            json!({
                "name": form.name,
                "email": form.email,
                "phone": form.phone,
                "username": form.username,
                "avatar_url": form.avatar_url,
            }),
            now,
        )
        .await
    }

    pub async fn set_username(
        &self,
        user_id: &str,
        username: &str,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        let mut fields = json!({ "username": username });
        if let Some(email) = email {
            fields["email"] = json!(email);
        }

        self.upsert_fields(user_id, fields, now).await
    }

    pub async fn set_avatar_url(
        &self,
        user_id: &str,
        avatar_url: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        self.upsert_fields(user_id, json!({ "avatar_url": avatar_url }), now)
            .await
    }

    pub async fn set_withdrawal_wallet(
        &self,
        user_id: &str,
        wallet_hash: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        self.upsert_fields(user_id, json!({ "withdrawal_wallet_hash": wallet_hash }), now)
            .await
    }

    pub async fn set_withdrawal_pin(
        &self,
        user_id: &str,
        pin: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        self.upsert_fields(user_id, json!({ "withdrawal_pin": pin }), now)
            .await
    }

    async fn upsert_fields(
        &self,
        user_id: &str,
        mut fields: Value,
        now: DateTime<Utc>,
    ) -> BackendResult<Profile> {
        fields["id"] = json!(user_id);
        fields["updated_at"] = json!(now);

        decode_row(self.conn.upsert(Table::Profiles, fields).await?)
    }
}
