use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    BonusWithdrawal,
    YieldWithdrawal,
}

impl TransactionType {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::BonusWithdrawal => "Bonus withdrawal",
            TransactionType::YieldWithdrawal => "Yield withdrawal",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub wallet_hash: String,
    pub status: TransactionStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub wallet_hash: String,
    pub status: TransactionStatus,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalForm {
    pub amount: f64,
    pub wallet_hash: String,
}

/// A statement line with display labels.
#[derive(Clone, Debug, Serialize)]
pub struct StatementEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub type_label: &'static str,
    pub status_label: &'static str,
}
