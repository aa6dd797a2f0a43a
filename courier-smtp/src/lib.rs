//! Async SMTP submission client used by the courier delivery pipeline.

pub mod client;

pub use client::{
    AuthMechanism, Capabilities, ClientError, MessageBuilder, Response, ResponseLine, SmtpClient,
};
