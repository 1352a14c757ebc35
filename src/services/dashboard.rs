use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use super::{current_user, RequestHandler, Service, ServiceError};
use crate::models::referrals::Referral;
use crate::models::session::Session;
use crate::models::stats::UserStats;
use crate::models::transactions::{Transaction, TransactionStatus, TransactionType};
use crate::models::yields::DailyYield;
use crate::repositories::referrals::ReferralRepository;
use crate::repositories::transactions::TransactionRepository;
use crate::repositories::yields::YieldRepository;

pub enum DashboardRequest {
    Stats {
        response: oneshot::Sender<Result<UserStats, ServiceError>>,
    },
}

pub fn compute_stats(
    yields: &[DailyYield],
    referrals: &[Referral],
    transactions: &[Transaction],
) -> UserStats {
    let counted = || {
        transactions
            .iter()
            .filter(|t| t.status != TransactionStatus::Failed)
    };

    let total_daily_yield = yields.iter().map(|y| y.yield_amount).sum();
    let total_referral_bonus: f64 = referrals.iter().map(|r| r.bonus_amount).sum();
    let total_withdrawals = counted().map(|t| t.amount).sum();
    let bonus_withdrawn: f64 = counted()
        .filter(|t| t.transaction_type == TransactionType::BonusWithdrawal)
        .map(|t| t.amount)
        .sum();

    UserStats {
        total_daily_yield,
        total_referral_bonus,
        available_bonus_balance: (total_referral_bonus - bonus_withdrawn).max(0.0),
        total_withdrawals,
    }
}

#[derive(Clone)]
pub struct DashboardRequestHandler {
    session: watch::Receiver<Option<Session>>,
    yields: YieldRepository,
    referrals: ReferralRepository,
    transactions: TransactionRepository,
}

impl DashboardRequestHandler {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        yields: YieldRepository,
        referrals: ReferralRepository,
        transactions: TransactionRepository,
    ) -> Self {
        Self {
            session,
            yields,
            referrals,
            transactions,
        }
    }

    async fn stats(&self) -> Result<UserStats, ServiceError> {
        let user = current_user(&self.session)?;

        let (yields, referrals, transactions) = tokio::try_join!(
            self.yields.get_daily_yields(&user.id),
            self.referrals.get_referrals(&user.id),
            self.transactions.get_transactions(&user.id),
        )?;

        Ok(compute_stats(&yields, &referrals, &transactions))
    }
}

#[async_trait]
impl RequestHandler<DashboardRequest> for DashboardRequestHandler {
    async fn handle_request(&self, request: DashboardRequest) {
        match request {
            DashboardRequest::Stats { response } => {
                let _ = response.send(self.stats().await);
            }
        }
    }
}

pub struct DashboardService;

impl DashboardService {
    pub fn new() -> Self {
        DashboardService {}
    }
}

#[async_trait]
impl Service<DashboardRequest, DashboardRequestHandler> for DashboardService {}
