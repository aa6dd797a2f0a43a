//! Shared building blocks for the courier workspace: relay configuration,
//! recipient address validation and logging setup.

pub mod address;
pub mod config;
pub mod error;
pub mod logging;

pub use tracing;

pub use address::{AddressError, Mailbox};
pub use config::{ClientTimeouts, RelayConfig, Secret, TimeoutConfig, TlsConfig, TlsPolicy};
pub use error::ConfigError;
