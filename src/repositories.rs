pub mod auth;
pub mod backend;
pub mod packages;
pub mod profiles;
pub mod realtime;
pub mod referrals;
pub mod storage;
pub mod transactions;
pub mod yields;

#[cfg(test)]
pub mod memory;
