use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub withdrawal_wallet_hash: Option<String>,
    #[serde(skip_serializing)]
    pub withdrawal_pin: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Editable profile fields, as submitted by the profile form.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PinForm {
    pub pin: String,
    pub confirm_pin: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WalletForm {
    pub wallet_hash: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PinStatus {
    pub has_pin: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct AvatarUpload {
    pub path: String,
    pub public_url: String,
}
