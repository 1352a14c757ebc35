use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use super::{current_user, RequestHandler, Service, ServiceError};
use crate::models::packages::PackageStatus;
use crate::models::session::Session;
use crate::models::transactions::{StatementEntry, Transaction, TransactionType, WithdrawalForm};
use crate::repositories::packages::PackageRepository;
use crate::repositories::transactions::TransactionRepository;
use crate::validation::{self, ValidationError};

pub enum WithdrawalRequest {
    Bonus {
        form: WithdrawalForm,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    Yield {
        form: WithdrawalForm,
        response: oneshot::Sender<Result<Transaction, ServiceError>>,
    },
    Statement {
        response: oneshot::Sender<Result<Vec<StatementEntry>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    session: watch::Receiver<Option<Session>>,
    transactions: TransactionRepository,
    packages: PackageRepository,
    require_package_for_yield: bool,
}

impl WithdrawalRequestHandler {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        transactions: TransactionRepository,
        packages: PackageRepository,
        require_package_for_yield: bool,
    ) -> Self {
        Self {
            session,
            transactions,
            packages,
            require_package_for_yield,
        }
    }

    async fn request_bonus(&self, form: WithdrawalForm) -> Result<Transaction, ServiceError> {
        let wallet = validation::bonus_withdrawal(form.amount, &form.wallet_hash)?;
        let user = current_user(&self.session)?;

        let transaction = self
            .transactions
            .new_withdrawal(&user.id, TransactionType::BonusWithdrawal, form.amount, &wallet)
            .await?;
        log::info!("Bonus withdrawal {} of {} requested.", transaction.id, form.amount);

        Ok(transaction)
    }

    async fn request_yield(&self, form: WithdrawalForm) -> Result<Transaction, ServiceError> {
        let wallet = validation::yield_withdrawal(form.amount, &form.wallet_hash)?;
        let user = current_user(&self.session)?;

        if self.require_package_for_yield && !self.holds_qualifying_package(&user.id).await? {
            return Err(ValidationError::NoQualifyingPackage.into());
        }

        let transaction = self
            .transactions
            .new_withdrawal(&user.id, TransactionType::YieldWithdrawal, form.amount, &wallet)
            .await?;
        log::info!("Yield withdrawal {} of {} requested.", transaction.id, form.amount);

        Ok(transaction)
    }

    async fn holds_qualifying_package(&self, user_id: &str) -> Result<bool, ServiceError> {
        for status in [PackageStatus::Active, PackageStatus::Completed] {
            if !self
                .packages
                .get_packages_by_status(user_id, status)
                .await?
                .is_empty()
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn statement(&self) -> Result<Vec<StatementEntry>, ServiceError> {
        let user = current_user(&self.session)?;

        Ok(self
            .transactions
            .get_transactions(&user.id)
            .await?
            .into_iter()
            .map(|transaction| StatementEntry {
                type_label: transaction.transaction_type.label(),
                status_label: transaction.status.label(),
                transaction,
            })
            .collect())
    }
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Bonus { form, response } => {
                let _ = response.send(self.request_bonus(form).await);
            }
            WithdrawalRequest::Yield { form, response } => {
                let _ = response.send(self.request_yield(form).await);
            }
            WithdrawalRequest::Statement { response } => {
                let _ = response.send(self.statement().await);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}
