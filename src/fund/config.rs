//! Fund parameters fixed at initialization.
//!
//! Fractions are stored as basis points so that every threshold comparison is
//! exact integer arithmetic. Durations are plain time units; in config files
//! they may also be written as human-readable strings ("7d", "1 hour") which
//! are read as seconds.

use super::clock::Timestamp;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis points in a whole.
pub const BPS_SCALE: u32 = 10_000;

/// A fraction in [0, 1] with basis-point precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Fraction(u32);

impl Fraction {
    pub const ONE: Fraction = Fraction(BPS_SCALE);

    /// Build from basis points (0..=10_000).
    pub fn from_bps(bps: u32) -> FundResult<Self> {
        if bps > BPS_SCALE {
            return Err(FundError::InvalidConfig(format!(
                "fraction of {} bps exceeds 1.0",
                bps
            )));
        }
        Ok(Self(bps))
    }

    /// Build from a decimal, rounded to the nearest basis point.
    pub fn from_decimal(value: f64) -> FundResult<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(FundError::InvalidConfig(format!(
                "fraction {} is outside [0, 1]",
                value
            )));
        }
        Self::from_bps((value * BPS_SCALE as f64).round() as u32)
    }

    pub fn bps(self) -> u32 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / BPS_SCALE as f64
    }

    /// `part >= self * whole`
    pub fn is_met_by(self, part: u64, whole: u64) -> bool {
        part as u128 * BPS_SCALE as u128 >= self.0 as u128 * whole as u128
    }
}

impl TryFrom<f64> for Fraction {
    type Error = FundError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Fraction> for f64 {
    fn from(fraction: Fraction) -> Self {
        fraction.as_decimal()
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0 as f64 / 100.0)
    }
}

/// Fund configuration, immutable after initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundConfig {
    /// Identity allowed to create milestones.
    pub proposer: Identity,

    /// Time a deposit must age before it carries voting power.
    #[serde(with = "duration_units", default = "default_lock_duration")]
    pub lock_duration: Timestamp,

    /// Approval share of eligible power needed to pass a milestone.
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: Fraction,

    /// Participation share of eligible power needed to decide a milestone.
    #[serde(default = "default_quorum_fraction")]
    pub quorum_fraction: Fraction,

    /// Signer share of eligible power needed to approve an emergency.
    /// Must be strictly greater than `threshold_fraction`.
    #[serde(default = "default_emergency_threshold_fraction")]
    pub emergency_threshold_fraction: Fraction,

    /// Lifetime of a pending emergency declaration.
    #[serde(with = "duration_units", default = "default_emergency_expiry_window")]
    pub emergency_expiry_window: Timestamp,

    /// Smallest accepted deposit.
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,

    /// Smallest voting power allowed to open an emergency declaration.
    #[serde(default = "default_min_emergency_stake")]
    pub min_emergency_stake: u64,
}

fn default_lock_duration() -> Timestamp {
    604_800 // 7 days
}

fn default_threshold_fraction() -> Fraction {
    Fraction(6_000)
}

fn default_quorum_fraction() -> Fraction {
    Fraction(5_000)
}

fn default_emergency_threshold_fraction() -> Fraction {
    Fraction(7_500)
}

fn default_emergency_expiry_window() -> Timestamp {
    259_200 // 3 days
}

fn default_min_deposit() -> u64 {
    1
}

fn default_min_emergency_stake() -> u64 {
    1
}

impl FundConfig {
    /// Default parameters with the given proposer.
    pub fn new(proposer: impl Into<Identity>) -> Self {
        Self {
            proposer: proposer.into(),
            lock_duration: default_lock_duration(),
            threshold_fraction: default_threshold_fraction(),
            quorum_fraction: default_quorum_fraction(),
            emergency_threshold_fraction: default_emergency_threshold_fraction(),
            emergency_expiry_window: default_emergency_expiry_window(),
            min_deposit: default_min_deposit(),
            min_emergency_stake: default_min_emergency_stake(),
        }
    }

    /// Reject parameter combinations the fund cannot operate under.
    pub fn validate(&self) -> FundResult<()> {
        if self.proposer.as_str().is_empty() {
            return Err(FundError::InvalidConfig(
                "proposer identity must not be empty".to_string(),
            ));
        }
        for (name, fraction) in [
            ("threshold_fraction", self.threshold_fraction),
            ("quorum_fraction", self.quorum_fraction),
            ("emergency_threshold_fraction", self.emergency_threshold_fraction),
        ] {
            if fraction.bps() == 0 {
                return Err(FundError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.emergency_threshold_fraction <= self.threshold_fraction {
            return Err(FundError::InvalidConfig(format!(
                "emergency_threshold_fraction ({}) must exceed threshold_fraction ({})",
                self.emergency_threshold_fraction, self.threshold_fraction
            )));
        }
        if self.emergency_expiry_window == 0 {
            return Err(FundError::InvalidConfig(
                "emergency_expiry_window must be positive".to_string(),
            ));
        }
        if self.min_deposit == 0 {
            return Err(FundError::InvalidConfig(
                "min_deposit must be at least 1".to_string(),
            ));
        }
        if self.min_emergency_stake == 0 {
            return Err(FundError::InvalidConfig(
                "min_emergency_stake must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter: integer time units, or a humantime string read as seconds.
mod duration_units {
    use super::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Units(u64),
        Human(String),
    }

    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Units(units) => Ok(units),
            Raw::Human(text) => humantime::parse_duration(text.trim())
                .map(|d| d.as_secs())
                .map_err(|e| serde::de::Error::custom(format!("invalid duration '{}': {}", text, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        fund: FundConfig,
    }

    #[test]
    fn test_defaults_validate() {
        let config = FundConfig::new("proposer");
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_fraction.bps(), 6_000);
    }

    #[test]
    fn test_fraction_rounding_and_bounds() {
        assert_eq!(Fraction::from_decimal(0.6).unwrap().bps(), 6_000);
        assert_eq!(Fraction::from_decimal(0.66667).unwrap().bps(), 6_667);
        assert!(Fraction::from_decimal(1.2).is_err());
        assert!(Fraction::from_decimal(-0.1).is_err());
        assert!(Fraction::from_decimal(f64::NAN).is_err());
        assert!(Fraction::from_bps(10_001).is_err());
    }

    #[test]
    fn test_fraction_comparisons_are_exact() {
        let sixty = Fraction::from_bps(6_000).unwrap();
        assert!(sixty.is_met_by(900, 1_500));
        assert!(!sixty.is_met_by(899, 1_500));
        // No overflow near the top of the range.
        assert!(Fraction::ONE.is_met_by(u64::MAX, u64::MAX));
    }

    #[test]
    fn test_emergency_threshold_must_exceed_threshold() {
        let mut config = FundConfig::new("proposer");
        config.emergency_threshold_fraction = config.threshold_fraction;
        let err = config.validate().unwrap_err();
        assert!(err.reason().contains("must exceed"));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = FundConfig::new("proposer");
        config.min_deposit = 0;
        assert!(config.validate().is_err());

        let mut config = FundConfig::new("proposer");
        config.emergency_expiry_window = 0;
        assert!(config.validate().is_err());

        let mut config = FundConfig::new("proposer");
        config.quorum_fraction = Fraction::from_bps(0).unwrap();
        assert!(config.validate().is_err());

        assert!(FundConfig::new("").validate().is_err());
    }

    #[test]
    fn test_toml_with_human_durations() {
        let parsed: Wrapper = toml::from_str(
            r#"
            [fund]
            proposer = "carol"
            lock_duration = "1 hour"
            threshold_fraction = 0.6
            quorum_fraction = 0.5
            emergency_threshold_fraction = 0.8
            emergency_expiry_window = 100
            "#,
        )
        .unwrap();
        let config = parsed.fund;
        assert_eq!(config.proposer, Identity::new("carol"));
        assert_eq!(config.lock_duration, 3_600);
        assert_eq!(config.emergency_expiry_window, 100);
        assert_eq!(config.emergency_threshold_fraction.bps(), 8_000);
        assert_eq!(config.min_deposit, 1);
    }

    #[test]
    fn test_toml_rejects_bad_duration_and_fraction() {
        assert!(toml::from_str::<Wrapper>(
            "[fund]\nproposer = \"p\"\nlock_duration = \"soon\"\n"
        )
        .is_err());
        assert!(toml::from_str::<Wrapper>(
            "[fund]\nproposer = \"p\"\nthreshold_fraction = 1.5\n"
        )
        .is_err());
    }
}
