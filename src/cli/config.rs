//! TimeFund configuration file handling
//!
//! Provides default configuration generation and loading for the operator CLI.
//! Configuration files are TOML format.
//!
//! ## Fund vs Operator Settings
//!
//! `[fund]` holds the parameters fixed when the fund is initialized (proposer,
//! lock duration, thresholds). Once a fund has a snapshot, those parameters
//! come from the snapshot, not from this file.
//!
//! `[logging]` is operator-only and may change between runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use timefund::fund::FundConfig;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimefundConfig {
    /// Fund parameters used when a new fund is initialized
    pub fund: FundConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl TimefundConfig {
    /// Load configuration from a TOML file
    ///
    /// Fund parameters are validated; an unusable combination is an error here
    /// rather than on the first call.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: TimefundConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config
            .fund
            .validate()
            .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(proposer: &str) -> String {
        format!(
            r#"# TimeFund Configuration
#
# [fund] parameters are fixed when the fund is initialized. Changing them
# here does not affect a fund that already has a snapshot.

[fund]
# Identity allowed to create milestones
proposer = "{proposer}"

# Time before a deposit carries voting power.
# Integer seconds, or a duration such as "7d" or "12h"
lock_duration = "7d"

# Approval share of eligible power needed to pass a milestone
threshold_fraction = 0.6

# Participation share of eligible power needed to decide a milestone
quorum_fraction = 0.5

# Signer share of eligible power needed to approve emergency recovery.
# Must be greater than threshold_fraction
emergency_threshold_fraction = 0.75

# How long an emergency declaration stays open
emergency_expiry_window = "3d"

# Smallest accepted deposit
min_deposit = 1

# Smallest voting power allowed to declare an emergency
min_emergency_stake = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/timefund/timefund.log"
"#,
            proposer = proposer
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        proposer: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(proposer);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default config file path
///
/// - Config: ~/.config/timefund/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timefund")
        .join("config.toml")
}

/// Get the default snapshot path
///
/// - Snapshot: ~/.local/share/timefund/fund.cbor
pub fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timefund")
        .join("fund.cbor")
}

#[cfg(test)]
impl TimefundConfig {
    /// Default fund parameters with the given proposer
    pub fn new(proposer: &str) -> Self {
        Self {
            fund: FundConfig::new(proposer),
            logging: LoggingConfig::default(),
        }
    }
}
