//! Message builder producing RFC 5322 messages with a text part, an HTML
//! part, or both as `multipart/alternative`.

use core::fmt::Write;

use base64::{Engine, engine::general_purpose::STANDARD};

use super::error::{ClientError, Result};

/// Line length for base64 bodies (RFC 2045 §6.8).
const BASE64_LINE: usize = 76;

/// Raw bytes per RFC 2047 encoded-word, keeping each word under 75 chars.
const ENCODED_WORD_BYTES: usize = 45;

/// Builder for report messages.
///
/// # Examples
///
/// ```
/// use courier_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("Reports", "reports@example.com")
///     .to("user@example.com")
///     .subject("Your report")
///     .text("Plain body")
///     .html("<p>HTML body</p>")
///     .boundary("report-boundary")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("multipart/alternative; boundary=\"report-boundary\""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<(String, String)>,
    to: Vec<String>,
    reply_to: Option<String>,
    subject: Option<String>,
    date: Option<String>,
    message_id: Option<String>,
    headers: Vec<(String, String)>,
    text: Option<String>,
    html: Option<String>,
    boundary: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` header as `display name <address>`.
    #[must_use]
    pub fn from(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.from = Some((name.into(), address.into()));
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Non-ASCII subjects are sent as RFC 2047 encoded-words.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// An RFC 5322 date, e.g. `Tue, 1 Jul 2025 10:52:37 +0000`.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// The `Message-ID`, without angle brackets.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Adds an extra header, written after the standard ones in insertion
    /// order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Fixes the multipart boundary. Without it a time-based one is used.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BuilderError`] if there is no sender, no
    /// recipient, or no body, or if a header value contains a line break.
    pub fn build(self) -> Result<String> {
        let (name, address) = self
            .from
            .as_ref()
            .ok_or_else(|| ClientError::BuilderError("Missing From address".to_string()))?;
        if self.to.is_empty() {
            return Err(ClientError::BuilderError("Missing To address".to_string()));
        }

        let mut message = String::with_capacity(4096);

        write_header(&mut message, "From", &mailbox(name, address))?;
        write_header(&mut message, "To", &self.to.join(", "))?;
        if let Some(reply_to) = &self.reply_to {
            write_header(&mut message, "Reply-To", reply_to)?;
        }
        if let Some(subject) = &self.subject {
            // Folding adds CRLFs of its own, so check the raw value.
            check_header("Subject", subject)?;
            write!(message, "Subject: {}\r\n", encode_word(subject))?;
        }
        if let Some(date) = &self.date {
            write_header(&mut message, "Date", date)?;
        }
        if let Some(id) = &self.message_id {
            write_header(&mut message, "Message-ID", &format!("<{id}>"))?;
        }
        for (name, value) in &self.headers {
            write_header(&mut message, name, value)?;
        }
        write_header(&mut message, "MIME-Version", "1.0")?;

        match (&self.text, &self.html) {
            (Some(text), Some(html)) => {
                let boundary = self.boundary.clone().unwrap_or_else(generate_boundary);
                write_header(
                    &mut message,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{boundary}\""),
                )?;
                message.push_str("\r\n");

                write!(message, "--{boundary}\r\n")?;
                write_part(&mut message, "text/plain", text)?;
                write!(message, "--{boundary}\r\n")?;
                write_part(&mut message, "text/html", html)?;
                write!(message, "--{boundary}--\r\n")?;
            }
            (Some(body), None) => write_part(&mut message, "text/plain", body)?,
            (None, Some(body)) => write_part(&mut message, "text/html", body)?,
            (None, None) => {
                return Err(ClientError::BuilderError("Missing message body".to_string()));
            }
        }

        Ok(message)
    }
}

fn check_header(name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(ClientError::BuilderError(format!(
            "Header {name} contains a line break"
        )));
    }
    Ok(())
}

fn write_header(message: &mut String, name: &str, value: &str) -> Result<()> {
    check_header(name, value)?;
    write!(message, "{name}: {value}\r\n")?;
    Ok(())
}

/// `Content-Type` and encoding headers, a blank line, then the base64 body.
fn write_part(message: &mut String, content_type: &str, body: &str) -> Result<()> {
    write!(message, "Content-Type: {content_type}; charset=utf-8\r\n")?;
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");

    let encoded = STANDARD.encode(body);
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is ASCII, so every chunk is valid UTF-8.
        message.push_str(std::str::from_utf8(line).map_err(ClientError::Utf8Error)?);
        message.push_str("\r\n");
    }

    Ok(())
}

/// `Display Name <address>`, quoting or encoding the display name as needed.
fn mailbox(name: &str, address: &str) -> String {
    const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

    if name.is_empty() {
        format!("<{address}>")
    } else if !name.is_ascii() {
        format!("{} <{address}>", encode_word(name))
    } else if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\" <{address}>")
    } else {
        format!("{name} <{address}>")
    }
}

/// RFC 2047 `B` encoding for non-ASCII header text, split on character
/// boundaries and folded across lines when long.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
    }

    words.join("\r\n ")
}

fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("----=_Part_{timestamp}")
}
