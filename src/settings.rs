use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Backend {
    pub url: String,
    pub anon_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Site {
    pub origin: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Monitor {
    pub interval_secs: u64,
    pub jitter_secs: u64,
    pub activation_delay_secs: u64,
    pub max_concurrency: usize,
}

impl Monitor {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    pub fn activation_delay(&self) -> Duration {
        Duration::from_secs(self.activation_delay_secs)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationProviderKind {
    Simulated,
    JsonRpc,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Confirmations {
    pub provider: ConfirmationProviderKind,
    pub rpc_url: Option<String>,
    pub required: u64,
    pub success_probability: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Packages {
    pub maturation_days: i64,
}

impl Packages {
    pub fn maturation_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.maturation_days)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Withdrawals {
    pub require_package_for_yield: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    pub avatar_bucket: String,
    pub max_avatar_bytes: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Local {
    pub data_dir: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Realtime {
    pub reconnect_secs: u64,
    pub heartbeat_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub backend: Backend,
    pub site: Site,
    pub monitor: Monitor,
    pub confirmations: Confirmations,
    pub packages: Packages,
    pub withdrawals: Withdrawals,
    pub storage: Storage,
    #[serde(default)]
    pub local: Local,
    pub realtime: Realtime,
}

impl Settings {
    /// Loads `path` (optional) and `PORTAL__SECTION__KEY` overrides on top of
    /// the defaults.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("site.origin", "http://localhost:8080")?
            .set_default("monitor.interval_secs", 30_i64)?
            .set_default("monitor.jitter_secs", 0_i64)?
            .set_default("monitor.activation_delay_secs", 60_i64)?
            .set_default("monitor.max_concurrency", 8_i64)?
            .set_default("confirmations.provider", "simulated")?
            .set_default("confirmations.required", 12_i64)?
            .set_default("confirmations.success_probability", 0.3)?
            .set_default("packages.maturation_days", 20_i64)?
            .set_default("withdrawals.require_package_for_yield", true)?
            .set_default("storage.avatar_bucket", "avatars")?
            .set_default("storage.max_avatar_bytes", 5_242_880_i64)?
            .set_default("realtime.reconnect_secs", 5_i64)?
            .set_default("realtime.heartbeat_secs", 30_i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PORTAL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Rejects values that would stall or break the running services.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(invalid("monitor.interval_secs must be at least 1."));
        }
        if self.monitor.max_concurrency == 0 {
            return Err(invalid("monitor.max_concurrency must be at least 1."));
        }
        if self.confirmations.required == 0 {
            return Err(invalid("confirmations.required must be at least 1."));
        }
        if !(0.0..=1.0).contains(&self.confirmations.success_probability) {
            return Err(invalid(
                "confirmations.success_probability must be between 0 and 1.",
            ));
        }
        if !MATURATION_DAYS.contains(&self.packages.maturation_days) {
            return Err(invalid(&format!(
                "packages.maturation_days must be between {} and {}.",
                MATURATION_DAYS.start(),
                MATURATION_DAYS.end()
            )));
        }
        if self.realtime.heartbeat_secs == 0 {
            return Err(invalid("realtime.heartbeat_secs must be at least 1."));
        }
        if self.realtime.reconnect_secs == 0 {
            return Err(invalid("realtime.reconnect_secs must be at least 1."));
        }

        Ok(())
    }
}

const MATURATION_DAYS: std::ops::RangeInclusive<i64> = 1..=3650;

fn invalid(message: &str) -> ConfigError {
    ConfigError::Message(message.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_values_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
url = "https://abc.example.co"
anon_key = "anon"

[monitor]
interval_secs = 10

[confirmations]
provider = "json_rpc"
rpc_url = "http://localhost:8545"
"#
        )
        .unwrap();

        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();

        assert_eq!(settings.backend.url, "https://abc.example.co");
        assert_eq!(settings.monitor.interval_secs, 10);
        assert_eq!(settings.monitor.activation_delay_secs, 60);
        assert_eq!(settings.monitor.max_concurrency, 8);
        assert_eq!(settings.confirmations.provider, ConfirmationProviderKind::JsonRpc);
        assert_eq!(settings.confirmations.required, 12);
        assert_eq!(settings.packages.maturation_days, 20);
        assert!(settings.withdrawals.require_package_for_yield);
        assert_eq!(settings.storage.max_avatar_bytes, 5_242_880);
        assert_eq!(settings.local.data_dir, None);
        assert_eq!(settings.site.origin, "http://localhost:8080");
    }

    fn load(extra: &str) -> Result<Settings, ConfigError> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"https://abc.example.co\"\nanon_key = \"anon\"\n{}",
            extra
        )
        .unwrap();

        Settings::new(file.path().to_str().unwrap())
    }

    fn rejected(extra: &str, key: &str) {
        match load(extra) {
            Err(ConfigError::Message(message)) => assert!(message.contains(key), "{}", message),
            other => panic!("{} accepted: {:?}", key, other.map(|_| ())),
        }
    }

    #[test]
    fn zero_poll_interval_rejected() {
        rejected("[monitor]\ninterval_secs = 0", "monitor.interval_secs");
    }

    #[test]
    fn zero_required_confirmations_rejected() {
        rejected("[confirmations]\nrequired = 0", "confirmations.required");
    }

    #[test]
    fn zero_heartbeat_rejected() {
        rejected("[realtime]\nheartbeat_secs = 0", "realtime.heartbeat_secs");
    }

    #[test]
    fn maturation_days_out_of_range_rejected() {
        rejected("[packages]\nmaturation_days = 0", "packages.maturation_days");
        rejected(
            &format!("[packages]\nmaturation_days = {}", i64::MAX),
            "packages.maturation_days",
        );
    }

    #[test]
    fn defaults_pass_validation() {
        let settings = load("").unwrap();

        assert_eq!(settings.packages.maturation_window(), chrono::Duration::days(20));
    }

    #[test]
    fn backend_is_required() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();

        assert!(Settings::new(file.path().to_str().unwrap()).is_err());
    }
}
