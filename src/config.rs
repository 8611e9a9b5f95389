use serde::Deserialize;
use std::time::Duration;

use crate::ledger::units::UNIT_SCALE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub claim: ClaimConfig,
    pub database: DatabaseConfig,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClaimConfig {
    /// Seconds between scheduled passes.
    pub interval_secs: u64,
    /// Delay inserted after every processed card, serializing load on the ledger.
    pub item_delay_ms: u64,
    /// Fraction of each successful claim forwarded to the receiver card, 0.0..=1.0.
    pub tax_rate: f64,
    /// Tax transfers are disabled entirely when no receiver is configured.
    pub receiver_card: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// User ids allowed to run admin commands (/claimnow, /reconcile).
    pub admin_users: Vec<u64>,
    /// Chat that receives the status panel message; no panel when absent.
    pub panel_chat_id: Option<i64>,
}

impl Config {
    /// Load configuration from the given file plus `CLAIMBOT__*` environment
    /// overrides (`CLAIMBOT__CLAIM__TAX_RATE=0.05` and so on).
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CLAIMBOT").separator("__"))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("ledger.base_url must not be empty"));
        }
        if self.ledger.timeout_secs == 0 {
            return Err(anyhow::anyhow!("ledger.timeout_secs must be positive"));
        }
        if self.claim.interval_secs == 0 {
            return Err(anyhow::anyhow!("claim.interval_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.claim.tax_rate) {
            return Err(anyhow::anyhow!(
                "claim.tax_rate must be within 0.0..=1.0, got {}",
                self.claim.tax_rate
            ));
        }
        // A 9th decimal place cannot be represented in base units; rounding
        // the scaled numerator would tax more than the configured rate.
        let scaled = self.claim.tax_rate * UNIT_SCALE as f64;
        if (scaled - scaled.round()).abs() > 1e-6 {
            return Err(anyhow::anyhow!(
                "claim.tax_rate supports at most 8 decimal places, got {}",
                self.claim.tax_rate
            ));
        }
        if let Some(receiver) = &self.claim.receiver_card {
            if receiver.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "claim.receiver_card must not be empty when present"
                ));
            }
        }
        Ok(())
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.claim.interval_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.claim.item_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs)
    }

    /// Tax rate as an integer numerator over [`UNIT_SCALE`], so the worker can
    /// compute tax in base units without touching floats again.
    pub fn tax_rate_scaled(&self) -> u64 {
        (self.claim.tax_rate * UNIT_SCALE as f64).round() as u64
    }
}
