use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_PACKAGE_AMOUNT: f64 = 50.0;
pub const MAX_PACKAGE_AMOUNT: f64 = 1000.0;

/// Advertised daily yield, as a fraction of the package amount.
pub const DAILY_YIELD_RATE: f64 = 0.10;
pub const RETURN_MULTIPLIER: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Pending,
    Active,
    Completed,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::Active => "active",
            PackageStatus::Completed => "completed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "Waiting for payment confirmation...",
            PackageStatus::Active => "Package active and accruing 10% per day",
            PackageStatus::Completed => "Yield released for withdrawal",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Package {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub status: PackageStatus,
    pub purchase_date: Option<DateTime<Utc>>,
    pub activation_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    pub daily_yield: Option<f64>,
    pub total_yield: Option<f64>,
    pub hash_payment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Package {
    pub fn expected_return(&self) -> f64 {
        self.amount * RETURN_MULTIPLIER
    }

    pub fn advertised_daily_yield(&self) -> f64 {
        self.amount * DAILY_YIELD_RATE
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewPackage {
    pub user_id: String,
    pub amount: f64,
    pub status: PackageStatus,
    pub purchase_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PackageActivation {
    pub status: PackageStatus,
    pub activation_date: DateTime<Utc>,
    pub hash_payment: String,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct PackageTier {
    pub amount: f64,
    pub title: &'static str,
    pub description: &'static str,
}

impl PackageTier {
    pub fn expected_return(&self) -> f64 {
        self.amount * RETURN_MULTIPLIER
    }

    pub fn daily_yield(&self) -> f64 {
        self.amount * DAILY_YIELD_RATE
    }
}

pub const PACKAGE_TIERS: [PackageTier; 5] = [
    PackageTier {
        amount: 50.0,
        title: "Starter",
        description: "Ideal for beginners",
    },
    PackageTier {
        amount: 100.0,
        title: "Basic",
        description: "Best value",
    },
    PackageTier {
        amount: 250.0,
        title: "Silver",
        description: "For serious investors",
    },
    PackageTier {
        amount: 500.0,
        title: "Gold",
        description: "High yield",
    },
    PackageTier {
        amount: 1000.0,
        title: "Diamond",
        description: "Maximum yield",
    },
];

/// A package as shown in the "my packages" view.
#[derive(Clone, Debug, Serialize)]
pub struct PackageView {
    #[serde(flatten)]
    pub package: Package,
    pub status_description: &'static str,
    pub expected_return: f64,
    pub advertised_daily_yield: f64,
    pub matures_at: Option<DateTime<Utc>>,
    pub time_remaining: Option<String>,
}
