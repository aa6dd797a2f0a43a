//! Test support utilities for pipeline tests
//!
//! A scripted SMTP relay the orchestrator can be pointed at.

pub mod mock_server;

pub use mock_server::{MockRelay, SmtpCommand};
