//! SMTP submission client.
//!
//! This module provides the primitives for talking to a mail relay on the
//! submission port:
//!
//! - Plain TCP connections with a STARTTLS upgrade
//! - EHLO capability parsing ([`Capabilities`])
//! - `AUTH PLAIN` and `AUTH LOGIN`
//! - Envelope commands (`MAIL FROM`, `RCPT TO`, `DATA`) with access to every
//!   reply, so callers can tell which recipients the relay refused
//! - A MIME [`MessageBuilder`] for `multipart/alternative` messages
//!
//! Timeouts are left to the caller: every operation is a plain
//! future that can be wrapped in `tokio::time::timeout` or dropped.
//!
//! # Examples
//!
//! ```no_run
//! use courier_smtp::client::{Capabilities, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com").await?;
//! client.read_greeting().await?;
//!
//! let capabilities = Capabilities::from_ehlo(&client.ehlo("localhost").await?);
//! if capabilities.starttls {
//!     client.starttls().await?;
//!     client.ehlo("localhost").await?;
//! }
//!
//! client.mail_from("reports@example.com").await?;
//! let reply = client.rcpt_to("user@example.com").await?;
//! assert!(reply.is_success());
//! # Ok(())
//! # }
//! ```

mod auth;
mod capabilities;
mod error;
mod message;
mod response;
mod smtp_client;

pub use auth::AuthMechanism;
pub use capabilities::Capabilities;
pub use error::{ClientError, Result};
pub use message::MessageBuilder;
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
