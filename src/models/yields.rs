use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DailyYield {
    pub id: Option<String>,
    pub package_id: String,
    pub user_id: String,
    pub yield_amount: f64,
    pub yield_date: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PackageYields {
    pub package_id: String,
    pub total: f64,
    pub yields: Vec<DailyYield>,
}
