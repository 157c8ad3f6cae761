//! Runtime configuration read from the environment (and `.env`).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

/// How the flash sale sweep picks the active sale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationMode {
    /// Activates the first running sale and deactivates every other sale in
    /// the same transaction.
    #[default]
    Exclusive,
    /// Walks sales in creation order, deactivating each until the first
    /// running one, activates it and stops. Sales after the match are left
    /// as they were.
    LegacyPartialScan,
}

impl ActivationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Some(Self::Exclusive),
            "legacy-partial-scan" | "legacy" => Some(Self::LegacyPartialScan),
            _ => None,
        }
    }
}

/// Sweep cadences. `cart_reprice` is also the longest a cached cart line
/// price can lag behind the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepIntervals {
    pub flash_sales: Duration,
    pub sale_expiry: Duration,
    pub cart_reprice: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            flash_sales: Duration::from_secs(60 * 60),
            sale_expiry: Duration::from_secs(60),
            cart_reprice: Duration::from_secs(15 * 60),
        }
    }
}

/// Settings the core services need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommerceConfig {
    pub currency: String,
    /// Every product in a cart needs at least this much stock to check out.
    pub checkout_min_stock: u32,
    pub activation: ActivationMode,
    pub sweeps: SweepIntervals,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self { currency: "USD".into(), checkout_min_stock: 5, activation: ActivationMode::default(), sweeps: SweepIntervals::default() }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub port: u16,
    pub commerce: CommerceConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = CommerceConfig::default();
        let sweeps = SweepIntervals {
            flash_sales: secs(&lookup, "FLASH_SALE_SWEEP_SECS", defaults.sweeps.flash_sales)?,
            sale_expiry: secs(&lookup, "SALE_EXPIRY_SWEEP_SECS", defaults.sweeps.sale_expiry)?,
            cart_reprice: secs(&lookup, "CART_REPRICE_SWEEP_SECS", defaults.sweeps.cart_reprice)?,
        };
        let activation = match lookup("FLASH_SALE_ACTIVATION") {
            Some(value) => ActivationMode::parse(&value).ok_or_else(|| ConfigError::Invalid {
                var: "FLASH_SALE_ACTIVATION",
                value,
                reason: "expected exclusive or legacy-partial-scan".into(),
            })?,
            None => defaults.activation,
        };
        let currency = lookup("CURRENCY").map(|c| c.trim().to_uppercase()).unwrap_or(defaults.currency);
        if currency.len() != 3 {
            return Err(ConfigError::Invalid { var: "CURRENCY", value: currency, reason: "expected a 3-letter code".into() });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            nats_url: lookup("NATS_URL"),
            port: number(&lookup, "PORT", 8083)?,
            commerce: CommerceConfig {
                currency,
                checkout_min_stock: number(&lookup, "CHECKOUT_MIN_STOCK", defaults.checkout_min_stock)?,
                activation,
                sweeps,
            },
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { var, reason: e.to_string(), value }),
        None => Ok(default),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let value: u64 = number(lookup, var, default.as_secs())?;
    if value == 0 {
        return Err(ConfigError::Invalid { var, value: "0".into(), reason: "interval must be positive".into() });
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.commerce, CommerceConfig::default());
        assert_eq!(config.commerce.sweeps.cart_reprice, Duration::from_secs(900));
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("CHECKOUT_MIN_STOCK", "2"),
            ("FLASH_SALE_ACTIVATION", "legacy-partial-scan"),
            ("CART_REPRICE_SWEEP_SECS", "30"),
            ("CURRENCY", "ngn"),
        ])
        .unwrap();
        assert_eq!(config.commerce.checkout_min_stock, 2);
        assert_eq!(config.commerce.activation, ActivationMode::LegacyPartialScan);
        assert_eq!(config.commerce.sweeps.cart_reprice, Duration::from_secs(30));
        assert_eq!(config.commerce.currency, "NGN");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { var: "PORT", .. })));
        assert!(matches!(config(&[("SALE_EXPIRY_SWEEP_SECS", "0")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("FLASH_SALE_ACTIVATION", "random")]), Err(ConfigError::Invalid { .. })));
    }
}
