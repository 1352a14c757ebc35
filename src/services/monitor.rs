use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rand::Rng;
use tokio::sync::{broadcast, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::confirmations::{should_activate, ConfirmationProvider};
use crate::models::packages::{Package, PackageStatus};
use crate::repositories::packages::PackageRepository;
use crate::settings::Settings;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub jitter: Duration,
    pub activation_delay: Duration,
    pub max_concurrency: usize,
    pub confirmations_required: u64,
}

impl MonitorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.monitor.interval(),
            jitter: settings.monitor.jitter(),
            activation_delay: settings.monitor.activation_delay(),
            max_concurrency: settings.monitor.max_concurrency.max(1),
            confirmations_required: settings.confirmations.required,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    Activated { package_id: String, amount: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InFlight {
    Checking,
    Scheduled,
}

/// Everything a monitor needs apart from the user it watches.
#[derive(Clone)]
pub struct MonitorContext {
    pub repository: PackageRepository,
    pub confirmations: Arc<dyn ConfirmationProvider>,
    pub clock: Arc<dyn Clock>,
    pub config: MonitorConfig,
    pub events: broadcast::Sender<MonitorEvent>,
}

impl MonitorContext {
    pub fn monitor_for(&self, user_id: &str) -> PackageMonitor {
        PackageMonitor::new(user_id.to_string(), self.clone())
    }
}

/// Watches one user's pending packages and activates them once their payment
/// is confirmed.
#[derive(Clone)]
pub struct PackageMonitor {
    user_id: String,
    context: MonitorContext,
    in_flight: Arc<DashMap<String, InFlight>>,
    slots: Arc<Semaphore>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl PackageMonitor {
    pub fn new(user_id: String, context: MonitorContext) -> Self {
        let slots = Arc::new(Semaphore::new(context.config.max_concurrency));
        let (shutdown, _) = watch::channel(false);

        Self {
            user_id,
            context,
            in_flight: Arc::new(DashMap::new()),
            slots,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Polls right away, then on every interval until stopped.
    pub fn start(&self) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut shutdown = monitor.shutdown.subscribe();
            log::info!("Package monitor started for user {}.", monitor.user_id);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                monitor.poll().await;

                tokio::select! {
                    _ = tokio::time::sleep(monitor.next_delay()) => {}
                    _ = shutdown.changed() => break,
                }
            }

            log::info!("Package monitor stopped for user {}.", monitor.user_id);
        })
    }

    /// Stops polling and cancels every scheduled activation.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn next_delay(&self) -> Duration {
        let jitter = self.context.config.jitter;
        if jitter.is_zero() {
            return self.context.config.interval;
        }

        let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
        self.context.config.interval + Duration::from_millis(extra)
    }

    pub async fn poll(&self) {
        if self.is_stopped() {
            return;
        }

        let pending = match self
            .context
            .repository
            .get_packages_by_status(&self.user_id, PackageStatus::Pending)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("Could not fetch pending packages: {}", e);
                return;
            }
        };

        for package in pending {
            self.check(package).await;
        }
    }

    fn release(&self, package_id: &str) {
        self.in_flight.remove(package_id);
    }

    async fn check(&self, package: Package) {
        match self.in_flight.entry(package.id.clone()) {
            Entry::Occupied(entry) => {
                log::debug!("Package {} already {:?}, skipping.", package.id, entry.get());
                return;
            }
            Entry::Vacant(entry) => {
                entry.insert(InFlight::Checking);
            }
        }

        let reference = match package
            .hash_payment
            .clone()
            .filter(|hash| !hash.trim().is_empty())
            .or_else(|| self.context.confirmations.synthesize_reference())
        {
            Some(reference) => reference,
            None => {
                log::debug!("Package {} has no payment reference yet.", package.id);
                self.release(&package.id);
                return;
            }
        };

        let status = match self
            .context
            .confirmations
            .confirmation_status(&reference)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                log::error!("Confirmation check failed for package {}: {}", package.id, e);
                self.release(&package.id);
                return;
            }
        };

        if !should_activate(&status, self.context.config.confirmations_required) {
            log::debug!(
                "Package {} not confirmed yet ({} confirmations).",
                package.id,
                status.confirmations
            );
            self.release(&package.id);
            return;
        }

        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log::warn!(
                    "Activation slots exhausted, package {} retried next poll.",
                    package.id
                );
                self.release(&package.id);
                return;
            }
        };

        self.in_flight
            .insert(package.id.clone(), InFlight::Scheduled);
        log::info!(
            "Payment for package {} confirmed, activating in {}s.",
            package.id,
            self.context.config.activation_delay.as_secs()
        );

        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.activate_later(package, reference, permit).await;
        });
    }

    async fn activate_later(&self, package: Package, reference: String, _permit: OwnedSemaphorePermit) {
        let mut shutdown = self.shutdown.subscribe();

        if !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = tokio::time::sleep(self.context.config.activation_delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        if *shutdown.borrow() {
            log::info!("Activation of package {} cancelled.", package.id);
            self.release(&package.id);
            return;
        }

        let activated_at = self.context.clock.now();
        match self
            .context
            .repository
            .activate_package(&package.id, activated_at, &reference)
            .await
        {
            Ok(Some(activated)) => {
                log::info!(
                    "Package {} of {} activated with payment {}.",
                    activated.id,
                    activated.amount,
                    reference
                );
                // nobody listening is fine
                let _ = self.context.events.send(MonitorEvent::Activated {
                    package_id: activated.id,
                    amount: activated.amount,
                });
            }
            Ok(None) => {
                log::debug!("Package {} was no longer pending.", package.id);
            }
            Err(e) => {
                log::error!("Could not activate package {}: {}", package.id, e);
            }
        }

        self.release(&package.id);
    }
}
