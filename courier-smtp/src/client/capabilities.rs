//! Extensions advertised in an EHLO reply.

use super::{auth::AuthMechanism, response::Response};

/// What the relay said it supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `STARTTLS` (RFC 3207)
    pub starttls: bool,
    /// Mechanisms from the `AUTH` line that this client understands, in the
    /// order the relay listed them.
    pub auth: Vec<AuthMechanism>,
    /// `SIZE` limit in bytes, if any (0 means no fixed limit).
    pub size: Option<usize>,
    pub eight_bit_mime: bool,
    pub pipelining: bool,
}

impl Capabilities {
    /// Parses the extension lines of an EHLO reply. The first line is the
    /// relay's greeting and is skipped.
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let mut capabilities = Self::default();

        for line in response.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };

            let keyword = keyword.to_ascii_uppercase();
            match keyword.as_str() {
                "STARTTLS" => capabilities.starttls = true,
                "8BITMIME" => capabilities.eight_bit_mime = true,
                "PIPELINING" => capabilities.pipelining = true,
                "SIZE" => {
                    capabilities.size =
                        Some(words.next().and_then(|n| n.parse().ok()).unwrap_or(0));
                }
                "AUTH" => capabilities.add_auth(words),
                other => {
                    // Some relays still send the pre-RFC `AUTH=LOGIN` form.
                    if let Some(first) = other.strip_prefix("AUTH=") {
                        capabilities.add_auth(std::iter::once(first).chain(words));
                    }
                }
            }
        }

        capabilities
    }

    fn add_auth<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        for mechanism in names.filter_map(AuthMechanism::parse) {
            if !self.auth.contains(&mechanism) {
                self.auth.push(mechanism);
            }
        }
    }

    /// The mechanism to use, preferring `PLAIN` (one round trip).
    #[must_use]
    pub fn preferred_auth(&self) -> Option<AuthMechanism> {
        if self.auth.contains(&AuthMechanism::Plain) {
            Some(AuthMechanism::Plain)
        } else {
            self.auth.first().copied()
        }
    }
}
