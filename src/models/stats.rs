use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub total_daily_yield: f64,
    pub total_referral_bonus: f64,
    pub available_bonus_balance: f64,
    pub total_withdrawals: f64,
}
