use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::{PkiError, Result};
use crate::key::MIN_RSA_BITS;

/// Longest certificate lifetime accepted, in days.
pub const MAX_VALIDITY_DAYS: i64 = 36_500;
/// Longest clock-skew allowance accepted, in hours.
pub const MAX_BACKDATE_HOURS: i64 = 24 * 365;
/// Longest anonymous cache TTL accepted, in seconds.
pub const MAX_ANONYMOUS_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;

/// Tunables of key and certificate issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiConfig {
    #[serde(default = "default_key_size_bits")]
    pub key_size_bits: usize,
    #[serde(default = "default_certificate_validity_days")]
    pub certificate_validity_days: i64,
    /// notBefore is set this far in the past to tolerate client clock skew
    #[serde(default = "default_backdate_hours")]
    pub backdate_hours: i64,
    #[serde(default = "default_anonymous_certificate_validity_days")]
    pub anonymous_certificate_validity_days: i64,
    /// Maximum cached anonymous certificates (0 disables the cache)
    #[serde(default = "default_anonymous_cache_capacity")]
    pub anonymous_cache_capacity: usize,
    #[serde(default = "default_anonymous_cache_ttl_secs")]
    pub anonymous_cache_ttl_secs: u64,
}

fn default_key_size_bits() -> usize {
    4096
}

fn default_certificate_validity_days() -> i64 {
    365
}

fn default_backdate_hours() -> i64 {
    24
}

fn default_anonymous_certificate_validity_days() -> i64 {
    2
}

fn default_anonymous_cache_capacity() -> usize {
    1000
}

fn default_anonymous_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            key_size_bits: default_key_size_bits(),
            certificate_validity_days: default_certificate_validity_days(),
            backdate_hours: default_backdate_hours(),
            anonymous_certificate_validity_days: default_anonymous_certificate_validity_days(),
            anonymous_cache_capacity: default_anonymous_cache_capacity(),
            anonymous_cache_ttl_secs: default_anonymous_cache_ttl_secs(),
        }
    }
}

impl PkiConfig {
    /// Parses and validates a JSON document; absent fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_size_bits < MIN_RSA_BITS {
            return Err(PkiError::InvalidInput(format!(
                "key_size_bits must be at least {MIN_RSA_BITS}, got {}",
                self.key_size_bits
            )));
        }
        for (field, days) in [
            ("certificate_validity_days", self.certificate_validity_days),
            (
                "anonymous_certificate_validity_days",
                self.anonymous_certificate_validity_days,
            ),
        ] {
            if !(1..=MAX_VALIDITY_DAYS).contains(&days) {
                return Err(PkiError::InvalidInput(format!(
                    "{field} must be between 1 and {MAX_VALIDITY_DAYS}, got {days}"
                )));
            }
        }
        if !(0..=MAX_BACKDATE_HOURS).contains(&self.backdate_hours) {
            return Err(PkiError::InvalidInput(format!(
                "backdate_hours must be between 0 and {MAX_BACKDATE_HOURS}, got {}",
                self.backdate_hours
            )));
        }
        if self.anonymous_cache_ttl_secs > MAX_ANONYMOUS_CACHE_TTL_SECS {
            return Err(PkiError::InvalidInput(format!(
                "anonymous_cache_ttl_secs must be at most {MAX_ANONYMOUS_CACHE_TTL_SECS}, got {}",
                self.anonymous_cache_ttl_secs
            )));
        }
        Ok(())
    }

    pub fn certificate_lifetime(&self) -> Duration {
        Duration::days(self.certificate_validity_days)
    }

    pub fn anonymous_certificate_lifetime(&self) -> Duration {
        Duration::days(self.anonymous_certificate_validity_days)
    }

    pub fn backdate(&self) -> Duration {
        Duration::hours(self.backdate_hours)
    }

    pub fn anonymous_cache_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.anonymous_cache_ttl_secs).unwrap_or(i64::MAX))
    }
}
