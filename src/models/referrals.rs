use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const REFERRAL_BONUS: f64 = 10.0;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub bonus_amount: f64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewReferral {
    pub referrer_id: String,
    pub referred_id: String,
    pub bonus_amount: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReferredProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralEntry {
    #[serde(flatten)]
    pub referral: Referral,
    pub referred_profile: Option<ReferredProfile>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralSummary {
    pub referrals: Vec<ReferralEntry>,
    pub total_bonus: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralLink {
    pub username: String,
    pub link: String,
}
