pub mod packages;
pub mod profiles;
pub mod referrals;
pub mod session;
pub mod stats;
pub mod transactions;
pub mod yields;
