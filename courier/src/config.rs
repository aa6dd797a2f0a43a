//! Top-level configuration for the `courier` binary.
//!
//! ```ron
//! (
//!     relay: (
//!         host: "smtp.gmail.com",
//!         port: 587,
//!         sender: Some("reports@example.com"),
//!         tls: (policy: required),
//!         timeouts: (total_ms: 60000),
//!     ),
//!     recorder: File(path: "/var/lib/courier/delivery_records.json"),
//!     retry: (max_attempts: 3),
//! )
//! ```
//!
//! The sender secret is normally left out of the file and supplied through
//! the environment, which is applied on top of whatever the file says.

use std::path::{Path, PathBuf};

use courier_common::{ConfigError, RelayConfig};
use courier_delivery::{RecorderConfig, RetryPolicy};
use serde::Deserialize;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_VAR: &str = "COURIER_CONFIG";

/// Searched in order when no file is named explicitly.
pub const DEFAULT_PATHS: [&str; 2] = [
    "./courier.config.ron",
    "/etc/courier/courier.config.ron",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl CourierConfig {
    /// Discover, read and environment-overlay the configuration.
    ///
    /// `explicit` (from the command line) wins over [`CONFIG_VAR`], which wins
    /// over [`DEFAULT_PATHS`]. With no file anywhere the defaults are used.
    ///
    /// # Errors
    ///
    /// If a named file is missing or unreadable, if it is not valid RON, or if
    /// an environment variable does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_VAR).map(PathBuf::from));
        let defaults = DEFAULT_PATHS.map(PathBuf::from);

        let config = match find_config_file(named, &defaults)? {
            Some(path) => Self::read(&path)?,
            None => Self::default(),
        };

        config.with_env(|key| std::env::var(key).ok())
    }

    /// Parse a RON configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        ron::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Overlay relay settings from `lookup`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if a numeric variable does not parse.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.relay = self.relay.apply_env_from(lookup)?;
        Ok(self)
    }
}

/// Pick the configuration file.
///
/// A `named` file must exist. Otherwise the first existing entry of
/// `defaults` is used, and `None` means there is no file at all.
///
/// # Errors
///
/// [`ConfigError::Read`] if `named` does not exist.
pub fn find_config_file(
    named: Option<PathBuf>,
    defaults: &[PathBuf],
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = named {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::Read {
            path: path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "configuration file does not exist",
            ),
        });
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}
