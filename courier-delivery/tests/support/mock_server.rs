//! Mock SMTP relay for pipeline tests
//!
//! This module provides a configurable mock relay that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each command with a configured reply (success, refusal, rejection)
//! - Run AUTH PLAIN and AUTH LOGIN exchanges
//! - Stall on a named command, never replying, to exercise deadlines
//! - Count accepted and currently open connections
//! - Track received commands for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockRelay;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let relay = MockRelay::builder()
//!     .with_rcpt_to_response(550, "5.1.1 User unknown") // Inject refusal
//!     .build()
//!     .await?;
//!
//! // Point a RelayConfig at relay.addr()
//!
//! relay.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// Verb that stalls after the message content instead of before a command.
pub const END_OF_DATA: &str = ".";

/// SMTP command received by the mock relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// STARTTLS command
    StartTls,
    /// AUTH command with mechanism name (credentials are not kept)
    Auth(String),
    /// MAIL FROM command
    MailFrom(String),
    /// RCPT TO command
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content (after DATA)
    MessageContent(Vec<u8>),
    /// RSET command
    Rset,
    /// QUIT command
    Quit,
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// Mock relay configuration
#[derive(Clone)]
struct MockRelayConfig {
    greeting: SmtpResponse,
    ehlo_code: u16,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls_response: SmtpResponse,

    // Failure injection
    connection_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    stall_on: Option<String>,
}

impl MockRelayConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.ehlo_code);
        }

        response.into_bytes()
    }

    fn stalls_on(&self, verb: &str) -> bool {
        self.stall_on
            .as_deref()
            .is_some_and(|stall| stall.eq_ignore_ascii_case(verb))
    }
}

impl Default for MockRelayConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "mock.example.com ESMTP"),
            ehlo_code: 250,
            capabilities: vec![
                "mock.example.com".to_string(),
                "AUTH PLAIN LOGIN".to_string(),
                "SIZE 10000000".to_string(),
            ],
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "2.1.0 OK"),
            rcpt_to_response: SmtpResponse::new(250, "2.1.5 OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "2.0.0 OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "2.0.0 Bye"),
            starttls_response: SmtpResponse::new(454, "4.7.0 TLS not available"),
            connection_delay: None,
            drop_after_commands: None,
            stall_on: None,
        }
    }
}

/// Decrements the open-connection gauge when a client handler ends.
struct OpenConnection(Arc<AtomicUsize>);

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock SMTP relay for testing
pub struct MockRelay {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    open_connections: Arc<AtomicUsize>,
}

impl MockRelay {
    /// Create a new builder for configuring the mock relay
    #[must_use]
    pub fn builder() -> MockRelayBuilder {
        MockRelayBuilder::new()
    }

    /// Get the address the relay is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get all commands received by the relay
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Number of connections accepted so far
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of connections whose client has not hung up yet
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Poll until every client connection has been closed, or `limit` passes.
    pub async fn wait_until_idle(&self, limit: Duration) -> bool {
        timeout(limit, async {
            while self.open_connections() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Shutdown the relay
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Reads until the client hangs up, without replying.
    async fn stall<R>(reader: &mut R) -> Result<(), Box<dyn std::error::Error>>
    where
        R: AsyncBufReadExt + Unpin,
    {
        let mut discard = String::new();
        while reader.read_line(&mut discard).await? > 0 {
            discard.clear();
        }
        Ok(())
    }

    /// Handle a single client connection
    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockRelayConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        // Apply connection delay if configured
        if let Some(delay) = config.connection_delay {
            tokio::time::sleep(delay).await;
        }

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        let mut local_command_count = 0;

        loop {
            line.clear();

            // Check if we should drop the connection
            if let Some(drop_after) = config.drop_after_commands
                && local_command_count >= drop_after
            {
                return Ok(());
            }

            if reader.read_line(&mut line).await? == 0 {
                // Connection closed
                return Ok(());
            }
            local_command_count += 1;

            let cmd_line = line.trim_end();
            tracing::debug!("Mock relay received: {}", cmd_line);

            let mut parts = cmd_line.splitn(2, ' ');
            let verb = parts.next().unwrap_or_default().to_uppercase();
            let argument = parts.next().unwrap_or_default().to_string();

            let smtp_cmd = match verb.as_str() {
                "EHLO" => SmtpCommand::Ehlo(argument.clone()),
                "STARTTLS" => SmtpCommand::StartTls,
                "AUTH" => SmtpCommand::Auth(
                    argument
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_uppercase(),
                ),
                "MAIL" => SmtpCommand::MailFrom(argument.clone()),
                "RCPT" => SmtpCommand::RcptTo(argument.clone()),
                "DATA" => SmtpCommand::Data,
                "RSET" => SmtpCommand::Rset,
                "QUIT" => SmtpCommand::Quit,
                _ => SmtpCommand::Other(cmd_line.to_string()),
            };
            commands.write().await.push(smtp_cmd.clone());

            if config.stalls_on(&verb) {
                return Self::stall(&mut reader).await;
            }

            let response = match smtp_cmd {
                SmtpCommand::Ehlo(_) => config.ehlo_bytes(),
                SmtpCommand::StartTls if config.starttls_response.code == 220 => {
                    // Agree, then hang up instead of handshaking
                    writer.write_all(&config.starttls_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                SmtpCommand::StartTls => config.starttls_response.to_bytes(),
                SmtpCommand::Auth(ref mechanism) if mechanism == "LOGIN" => {
                    // Username and password challenges, then the verdict
                    for challenge in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                        writer
                            .write_all(format!("334 {challenge}\r\n").as_bytes())
                            .await?;
                        writer.flush().await?;
                        line.clear();
                        if reader.read_line(&mut line).await? == 0 {
                            return Ok(());
                        }
                    }
                    config.auth_response.to_bytes()
                }
                SmtpCommand::Auth(_) => config.auth_response.to_bytes(),
                SmtpCommand::MailFrom(_) => config.mail_from_response.to_bytes(),
                SmtpCommand::RcptTo(_) => config.rcpt_to_response.to_bytes(),
                SmtpCommand::Data => config.data_response.to_bytes(),
                SmtpCommand::Rset => SmtpResponse::new(250, "2.0.0 OK").to_bytes(),
                SmtpCommand::Quit => {
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                SmtpCommand::MessageContent(_) | SmtpCommand::Other(_) => {
                    SmtpResponse::new(500, "5.5.2 Unknown command").to_bytes()
                }
            };

            writer.write_all(&response).await?;
            writer.flush().await?;

            // Handle DATA content if we just accepted DATA
            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line.trim_end() == "." {
                        break;
                    }

                    message_content.extend_from_slice(data_line.as_bytes());
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(message_content));

                if config.stalls_on(END_OF_DATA) {
                    return Self::stall(&mut reader).await;
                }

                writer
                    .write_all(&config.data_end_response.to_bytes())
                    .await?;
                writer.flush().await?;
            }
        }
    }
}

/// Builder for configuring a `MockRelay`
pub struct MockRelayBuilder {
    config: MockRelayConfig,
}

impl MockRelayBuilder {
    fn new() -> Self {
        Self {
            config: MockRelayConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set the EHLO reply code and capability lines (the first line is the
    /// relay's greeting name)
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_code = code;
        self.config.capabilities = capabilities;
        self
    }

    /// Set the final AUTH reply
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS reply. A 220 is sent and the connection closed
    /// before any handshake.
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    /// Add a delay before the greeting
    #[must_use]
    pub const fn with_connection_delay(mut self, delay: Duration) -> Self {
        self.config.connection_delay = Some(delay);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Never answer `verb` (e.g. `"DATA"`, or [`END_OF_DATA`]); keep the
    /// connection open until the client hangs up
    #[must_use]
    pub fn with_stall_on(mut self, verb: impl Into<String>) -> Self {
        self.config.stall_on = Some(verb.into());
        self
    }

    /// Build and start the mock relay
    ///
    /// # Errors
    ///
    /// Returns an error if the relay fails to bind to a port
    pub async fn build(self) -> Result<MockRelay, std::io::Error> {
        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));
        let open_connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);
        let open_clone = Arc::clone(&open_connections);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    connections_clone.fetch_add(1, Ordering::SeqCst);
                    open_clone.fetch_add(1, Ordering::SeqCst);
                    let guard = OpenConnection(Arc::clone(&open_clone));

                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = MockRelay::handle_client(stream, config, commands).await {
                            tracing::debug!("Mock relay client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockRelay {
            addr,
            commands_received: commands,
            shutdown,
            connections,
            open_connections,
        })
    }
}
