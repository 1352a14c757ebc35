use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};

use super::monitor::Clock;
use super::{current_user, RequestHandler, Service, ServiceError};
use crate::countdown;
use crate::models::packages::{Package, PackageStatus, PackageView};
use crate::models::session::Session;
use crate::models::yields::{DailyYield, PackageYields};
use crate::repositories::packages::PackageRepository;
use crate::repositories::yields::YieldRepository;
use crate::validation;

pub enum PackageRequest {
    Purchase {
        amount: f64,
        response: oneshot::Sender<Result<Package, ServiceError>>,
    },
    List {
        response: oneshot::Sender<Result<Vec<PackageView>, ServiceError>>,
    },
    Get {
        id: String,
        response: oneshot::Sender<Result<PackageView, ServiceError>>,
    },
    Delete {
        id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Yields {
        response: oneshot::Sender<Result<Vec<PackageYields>, ServiceError>>,
    },
}

/// Countdown data is anchored at activation and only exists for active
/// packages.
pub fn package_view(package: Package, now: DateTime<Utc>, window: chrono::Duration) -> PackageView {
    let (matures_at, time_remaining) = match (package.status, package.activation_date) {
        (PackageStatus::Active, Some(start)) => (
            Some(countdown::maturity(start, window)),
            Some(countdown::countdown(now, start, window).to_string()),
        ),
        _ => (None, None),
    };

    PackageView {
        status_description: package.status.description(),
        expected_return: package.expected_return(),
        advertised_daily_yield: package.advertised_daily_yield(),
        matures_at,
        time_remaining,
        package,
    }
}

/// Groups yields by package, keeping the incoming (newest first) order.
pub fn group_yields(yields: Vec<DailyYield>) -> Vec<PackageYields> {
    let mut groups: Vec<PackageYields> = Vec::new();

    for daily in yields {
        match groups.iter_mut().find(|g| g.package_id == daily.package_id) {
            Some(group) => {
                group.total += daily.yield_amount;
                group.yields.push(daily);
            }
            None => groups.push(PackageYields {
                package_id: daily.package_id.clone(),
                total: daily.yield_amount,
                yields: vec![daily],
            }),
        }
    }

    groups
}

#[derive(Clone)]
pub struct PackageRequestHandler {
    session: watch::Receiver<Option<Session>>,
    packages: PackageRepository,
    yields: YieldRepository,
    clock: Arc<dyn Clock>,
    maturation: chrono::Duration,
}

impl PackageRequestHandler {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        packages: PackageRepository,
        yields: YieldRepository,
        clock: Arc<dyn Clock>,
        maturation: chrono::Duration,
    ) -> Self {
        Self {
            session,
            packages,
            yields,
            clock,
            maturation,
        }
    }

    async fn purchase(&self, amount: f64) -> Result<Package, ServiceError> {
        let amount = validation::package_amount(amount)?;
        let user = current_user(&self.session)?;

        let package = self
            .packages
            .insert_package(&user.id, amount, self.clock.now())
            .await?;
        log::info!("Package {} of {} created for user {}.", package.id, amount, user.id);

        Ok(package)
    }

    async fn list(&self) -> Result<Vec<PackageView>, ServiceError> {
        let user = current_user(&self.session)?;
        let now = self.clock.now();

        Ok(self
            .packages
            .get_packages(&user.id)
            .await?
            .into_iter()
            .map(|package| package_view(package, now, self.maturation))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<PackageView, ServiceError> {
        let user = current_user(&self.session)?;

        match self.packages.get_package(&user.id, id).await? {
            Some(package) => Ok(package_view(package, self.clock.now(), self.maturation)),
            None => Err(ServiceError::NotFound(format!("Package {}", id))),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let user = current_user(&self.session)?;

        if !self.packages.delete_pending_package(&user.id, id).await? {
            return Err(ServiceError::NotFound(format!("Pending package {}", id)));
        }
        log::info!("Pending package {} deleted.", id);

        Ok(())
    }

    async fn yields(&self) -> Result<Vec<PackageYields>, ServiceError> {
        let user = current_user(&self.session)?;

        Ok(group_yields(self.yields.get_daily_yields(&user.id).await?))
    }
}

#[async_trait]
impl RequestHandler<PackageRequest> for PackageRequestHandler {
    async fn handle_request(&self, request: PackageRequest) {
        match request {
            PackageRequest::Purchase { amount, response } => {
                let _ = response.send(self.purchase(amount).await);
            }
            PackageRequest::List { response } => {
                let _ = response.send(self.list().await);
            }
            PackageRequest::Get { id, response } => {
                let _ = response.send(self.get(&id).await);
            }
            PackageRequest::Delete { id, response } => {
                let _ = response.send(self.delete(&id).await);
            }
            PackageRequest::Yields { response } => {
                let _ = response.send(self.yields().await);
            }
        }
    }
}

pub struct PackageService;

impl PackageService {
    pub fn new() -> Self {
        PackageService {}
    }
}

#[async_trait]
impl Service<PackageRequest, PackageRequestHandler> for PackageService {}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::repositories::backend::{Backend, Table};
    use crate::repositories::memory::MemoryBackend;
    use crate::services::test_support::{session_for, FixedClock};
    use crate::validation::ValidationError;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn handler(backend: Arc<MemoryBackend>, signed_in: bool) -> PackageRequestHandler {
        let conn = backend as Arc<dyn Backend>;
        let (_tx, session) = watch::channel(signed_in.then(|| session_for("u1")));

        PackageRequestHandler::new(
            session,
            PackageRepository::new(conn.clone()),
            YieldRepository::new(conn),
            Arc::new(FixedClock(now())),
            chrono::Duration::days(20),
        )
    }

    #[tokio::test]
    async fn purchase_validates_before_writing() {
        let backend = Arc::new(MemoryBackend::new());
        let handler = handler(backend.clone(), true);

        let result = handler.purchase(49.99).await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::PackageAmount))
        ));
        assert!(backend.rows(Table::Packages).is_empty());

        let package = handler.purchase(250.0).await.unwrap();
        assert_eq!(package.status, PackageStatus::Pending);
        assert_eq!(package.user_id, "u1");
        assert_eq!(package.purchase_date, Some(now()));
        assert_eq!(backend.rows(Table::Packages).len(), 1);
    }

    #[tokio::test]
    async fn purchase_requires_session() {
        let backend = Arc::new(MemoryBackend::new());
        let handler = handler(backend, false);

        assert!(matches!(
            handler.purchase(100.0).await,
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn list_adds_countdown_for_active_packages() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::Packages,
            json!({
                "id": "a", "user_id": "u1", "amount": 100.0, "status": "active",
                "activation_date": "2026-05-30T00:00:00Z"
            }),
        );
        backend.seed(
            Table::Packages,
            json!({ "id": "p", "user_id": "u1", "amount": 50.0, "status": "pending" }),
        );
        backend.seed(
            Table::Packages,
            json!({ "id": "x", "user_id": "u2", "amount": 50.0, "status": "pending" }),
        );

        let views = handler(backend, true).list().await.unwrap();
        assert_eq!(views.len(), 2);

        let active = views.iter().find(|v| v.package.id == "a").unwrap();
        assert_eq!(active.time_remaining.as_deref(), Some("18d 00h 00m 00s"));
        assert_eq!(
            active.matures_at,
            Some(Utc.with_ymd_and_hms(2026, 6, 19, 0, 0, 0).unwrap())
        );
        assert_eq!(active.expected_return, 200.0);
        assert_eq!(active.advertised_daily_yield, 10.0);

        let pending = views.iter().find(|v| v.package.id == "p").unwrap();
        assert_eq!(pending.time_remaining, None);
    }

    #[tokio::test]
    async fn only_pending_packages_are_deleted() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::Packages,
            json!({ "id": "a", "user_id": "u1", "amount": 100.0, "status": "active" }),
        );
        backend.seed(
            Table::Packages,
            json!({ "id": "p", "user_id": "u1", "amount": 50.0, "status": "pending" }),
        );
        let handler = handler(backend.clone(), true);

        assert!(matches!(
            handler.delete("a").await,
            Err(ServiceError::NotFound(_))
        ));
        handler.delete("p").await.unwrap();

        assert_eq!(backend.rows(Table::Packages).len(), 1);
    }

    #[test]
    fn yields_grouped_per_package() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 6, d).unwrap();
        let entry = |package: &str, amount: f64, d: u32| DailyYield {
            id: None,
            package_id: package.to_string(),
            user_id: "u1".to_string(),
            yield_amount: amount,
            yield_date: day(d),
            created_at: None,
        };

        let groups = group_yields(vec![
            entry("b", 5.0, 3),
            entry("a", 10.0, 3),
            entry("b", 5.0, 2),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].package_id, "b");
        assert_eq!(groups[0].total, 10.0);
        assert_eq!(groups[0].yields[1].yield_date, day(2));
        assert_eq!(groups[1].total, 10.0);
    }
}
