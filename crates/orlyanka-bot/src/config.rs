//! Environment-driven configuration.
//!
//! All options come from `ORLYANKA_`-prefixed environment variables, matching
//! how the bot is deployed. Identity and credentials are mandatory; game
//! tunables have defaults.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `ORLYANKA_GROUP_TOKEN` | VK group access token |
//! | `ORLYANKA_GROUP_ID` | VK group id |
//! | `ORLYANKA_MERCHANT_ID` | merchant identity in the coin ledger |
//! | `ORLYANKA_MERCHANT_KEY` | merchant secret key |
//! | `ORLYANKA_PAYLOAD` | deployment payload tag |
//! | `ORLYANKA_MIN_BET` / `ORLYANKA_MAX_BET` | stake bounds, thousandths |
//! | `ORLYANKA_WIN_CHANCE` | win probability, percent |
//! | `ORLYANKA_FLUSH_INTERVAL_MS` | execute-pool flush cadence |
//! | `ORLYANKA_RECONCILE_INTERVAL_SECS` | ledger poll cadence |
//! | `ORLYANKA_DATABASE_PATH` | SQLite file path |
//! | `ORLYANKA_LOG_LEVEL` | default tracing filter |

use figment::Figment;
use figment::providers::Env;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime configuration, built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// VK group access token.
    pub group_token: String,

    /// VK group (community) id.
    pub group_id: i64,

    /// Merchant identity in the coin ledger.
    pub merchant_id: i64,

    /// Merchant secret key.
    pub merchant_key: String,

    /// Payload tag marking this deployment's ledger transactions.
    pub payload: i64,

    /// Smallest allowed stake, in thousandths of a coin.
    #[serde(default = "default_min_bet")]
    pub min_bet: i64,

    /// Largest allowed stake, in thousandths of a coin.
    #[serde(default = "default_max_bet")]
    pub max_bet: i64,

    /// Win probability in percent.
    #[serde(default = "default_win_chance")]
    pub win_chance: u32,

    /// Execute-pool flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Ledger reconciliation cadence in seconds.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// SQLite database file path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Base tracing filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_min_bet() -> i64 {
    1_000
}

fn default_max_bet() -> i64 {
    10_000_000
}

fn default_win_chance() -> u32 {
    45
}

fn default_flush_interval_ms() -> u64 {
    550
}

fn default_reconcile_interval_secs() -> u64 {
    2
}

fn default_database_path() -> String {
    "orlyanka.sqlite".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BotConfig {
    /// Loads from `ORLYANKA_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Env::prefixed("ORLYANKA_")))
    }

    /// Extracts and validates from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.win_chance > 100 {
            return Err(ConfigError::Invalid(format!(
                "win_chance must be 0..=100, got {}",
                self.win_chance
            )));
        }
        if self.min_bet <= 0 {
            return Err(ConfigError::Invalid("min_bet must be positive".to_string()));
        }
        if self.max_bet < self.min_bet {
            return Err(ConfigError::Invalid(format!(
                "max_bet {} is below min_bet {}",
                self.max_bet, self.min_bet
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde_json::json;

    fn figment_with(value: serde_json::Value) -> Figment {
        Figment::new().merge(Serialized::defaults(value))
    }

    fn minimal() -> serde_json::Value {
        json!({
            "group_token": "t",
            "group_id": 1,
            "merchant_id": 2,
            "merchant_key": "k",
            "payload": 777
        })
    }

    #[test]
    fn defaults_fill_the_tunables() {
        let config = BotConfig::from_figment(figment_with(minimal())).unwrap();
        assert_eq!(config.min_bet, 1_000);
        assert_eq!(config.max_bet, 10_000_000);
        assert_eq!(config.win_chance, 45);
        assert_eq!(config.flush_interval_ms, 550);
        assert_eq!(config.reconcile_interval_secs, 2);
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("merchant_key");
        assert!(BotConfig::from_figment(figment_with(value)).is_err());
    }

    #[test]
    fn out_of_range_win_chance_is_rejected() {
        let mut value = minimal();
        value["win_chance"] = json!(146);
        let err = BotConfig::from_figment(figment_with(value)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_bet_bounds_are_rejected() {
        let mut value = minimal();
        value["min_bet"] = json!(5000);
        value["max_bet"] = json!(100);
        assert!(BotConfig::from_figment(figment_with(value)).is_err());
    }
}
