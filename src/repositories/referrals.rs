use std::sync::Arc;

use super::backend::{decode_row, decode_rows, Backend, BackendResult, Query, Table};
use crate::models::referrals::{NewReferral, Referral, REFERRAL_BONUS};

#[derive(Clone)]
pub struct ReferralRepository {
    conn: Arc<dyn Backend>,
}

impl ReferralRepository {
    pub fn new(conn: Arc<dyn Backend>) -> Self {
        Self { conn }
    }

    pub async fn insert_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
    ) -> BackendResult<Referral> {
        let referral = NewReferral {
            referrer_id: referrer_id.to_string(),
            referred_id: referred_id.to_string(),
            bonus_amount: REFERRAL_BONUS,
        };

        let row = self
            .conn
            .insert(Table::Referrals, serde_json::to_value(referral)?)
            .await?;

        decode_row(row)
    }

    pub async fn get_referrals(&self, referrer_id: &str) -> BackendResult<Vec<Referral>> {
        let query = Query::new()
            .select("id, referrer_id, referred_id, bonus_amount, created_at")
            .eq("referrer_id", referrer_id)
            .order("created_at", false);

        decode_rows(self.conn.select(Table::Referrals, &query).await?)
    }
}
