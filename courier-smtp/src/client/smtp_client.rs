//! SMTP client implementation with STARTTLS and AUTH support.

use std::sync::Arc;

use courier_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::CryptoProvider,
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    auth::{self, AuthMechanism},
    capabilities::Capabilities,
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Upper bound on a single reply, to avoid unbounded growth.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        if !certs.errors.is_empty() {
            tracing::warn!(errors = ?certs.errors, "Some native certificates could not be loaded");
        }
        let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
        tracing::trace!(added, ignored, "Loaded native root certificates");

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            let provider = Arc::clone(config.crypto_provider());
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier(provider)));
        }

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain {domain}: {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// Accepts any certificate. Only installed when `accept_invalid_certs` is set.
///
/// Offers every signature scheme the crypto provider can verify, so relays
/// with P-384 or SHA-384/512 certificates still complete the handshake.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// An SMTP client for sending commands and receiving responses.
///
/// Dropping the client closes the socket.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
    capabilities: Capabilities,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`. `server_domain` is used for TLS
    /// server name verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain: server_domain.into(),
            accept_invalid_certs: false,
            capabilities: Capabilities::default(),
        })
    }

    /// Sets whether to accept invalid TLS certificates (self-signed relays).
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Extensions from the most recent successful EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command line to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        self.write_line(command).await
    }

    /// Sends a line that carries credentials; it is logged redacted.
    async fn send_sensitive(&mut self, redacted: &str, line: &str) -> Result<()> {
        outgoing!("{redacted} ***");
        self.write_line(line).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    /// Sends a command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends EHLO and records the advertised capabilities on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            self.capabilities = Capabilities::from_ehlo(&response);
        }
        Ok(response)
    }

    /// Sends STARTTLS and, if accepted, upgrades the connection. Capabilities
    /// are cleared; EHLO must be sent again afterwards (RFC 3207).
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Ok(response);
        }

        if self.accept_invalid_certs {
            tracing::warn!(
                server = %self.server_domain,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
        self.connection = Some(
            connection
                .upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                .await?,
        );
        self.buffer_pos = 0;
        self.capabilities = Capabilities::default();

        Ok(response)
    }

    /// Authenticates with the mechanism the relay prefers (see
    /// [`Capabilities::preferred_auth`]).
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthNotSupported`] if no usable mechanism was
    /// advertised, [`ClientError::AuthenticationFailed`] if the relay
    /// rejects the credentials.
    pub async fn login(&mut self, user: &str, secret: &str) -> Result<AuthMechanism> {
        let mechanism = self
            .capabilities
            .preferred_auth()
            .ok_or(ClientError::AuthNotSupported)?;
        self.authenticate(mechanism, user, secret).await?;
        Ok(mechanism)
    }

    /// Runs a single AUTH exchange.
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthenticationFailed`] on a 4xx/5xx reply,
    /// [`ClientError::UnexpectedResponse`] on anything else that is not 235.
    pub async fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        user: &str,
        secret: &str,
    ) -> Result<Response> {
        let response = match mechanism {
            AuthMechanism::Plain => {
                let line = format!("AUTH PLAIN {}", auth::plain_initial_response(user, secret));
                self.send_sensitive("AUTH PLAIN", &line).await?;
                self.read_response().await?
            }
            AuthMechanism::Login => {
                let challenge = self.command("AUTH LOGIN").await?;
                Self::expect_challenge(&challenge)?;

                self.send_sensitive("AUTH LOGIN username", &auth::encode(user))
                    .await?;
                let challenge = self.read_response().await?;
                Self::expect_challenge(&challenge)?;

                self.send_sensitive("AUTH LOGIN password", &auth::encode(secret))
                    .await?;
                self.read_response().await?
            }
        };

        match response.code {
            235 => Ok(response),
            _ if response.is_error() => Err(ClientError::AuthenticationFailed {
                code: response.code,
                message: response.message(),
            }),
            code => Err(ClientError::UnexpectedResponse {
                code,
                message: response.message(),
            }),
        }
    }

    fn expect_challenge(response: &Response) -> Result<()> {
        match response.code {
            334 => Ok(()),
            _ if response.is_error() => Err(ClientError::AuthenticationFailed {
                code: response.code,
                message: response.message(),
            }),
            code => Err(ClientError::UnexpectedResponse {
                code,
                message: response.message(),
            }),
        }
    }

    /// Sends `MAIL FROM:<from>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Sends `RCPT TO:<to>`. A refusal is a normal reply, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content (dot-stuffed) followed by the end-of-data
    /// marker and reads the final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let payload = dot_stuff(data);
        outgoing!(bytes = payload.len(), "<message content>");

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(payload.as_bytes())
            .await?;

        self.read_response().await
    }

    /// Sends RSET.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Reads a complete SMTP reply.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{response}");
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// RFC 5321 §4.5.2 transparency, CRLF termination and the end-of-data line.
fn dot_stuff(data: &str) -> String {
    let mut payload = String::with_capacity(data.len() + 8);

    for line in data.split_inclusive('\n') {
        if line.starts_with('.') {
            payload.push('.');
        }
        payload.push_str(line);
    }

    if !payload.ends_with("\r\n") {
        if payload.ends_with('\n') {
            payload.pop();
        }
        payload.push_str("\r\n");
    }
    payload.push_str(".\r\n");
    payload
}
