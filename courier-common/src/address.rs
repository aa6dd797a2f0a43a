//! Syntactic validation of recipient addresses.
//!
//! Only the common `local-part@domain` shape is accepted:
//!
//! ```text
//! Mailbox     = Local-part "@" Domain
//! Local-part  = Atom *("." Atom)
//! Atom        = 1*( ALPHA / DIGIT / "." / "_" / "%" / "+" / "-" )
//! Domain      = Label 1*("." Label)
//! Label       = 1*( ALPHA / DIGIT / "-" )     ; no leading or trailing "-"
//! TLD         = 2*ALPHA                      ; the final label
//! ```
//!
//! Quoted local parts and address literals are rejected; a report is only
//! ever sent to an ordinary mailbox. Validation never touches the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum local-part length (RFC 5321 Section 4.5.3.1.1).
const MAX_LOCAL_PART: usize = 64;

/// Maximum domain length (RFC 5321 Section 4.5.3.1.2).
const MAX_DOMAIN: usize = 255;

/// Maximum total address length once the brackets of a path are removed.
const MAX_ADDRESS: usize = 254;

/// Result type for address validation
pub type Result<T> = std::result::Result<T, AddressError>;

/// Reasons a recipient address is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address exceeds {MAX_ADDRESS} octets")]
    TooLong,

    #[error("Missing '@' separator")]
    MissingAtSign,

    #[error("More than one '@' in address")]
    MultipleAtSigns,

    #[error("Empty local-part")]
    EmptyLocalPart,

    #[error("Local-part exceeds {MAX_LOCAL_PART} octets")]
    LocalPartTooLong,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Empty domain")]
    EmptyDomain,

    #[error("Domain exceeds {MAX_DOMAIN} octets")]
    DomainTooLong,

    #[error("Domain has no '.'")]
    MissingDomainDot,

    #[error("Address contains consecutive dots")]
    ConsecutiveDots,

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// A validated mailbox (`local_part@domain`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    /// The local part (before @)
    pub local_part: String,
    /// The domain (after @)
    pub domain: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl std::str::FromStr for Mailbox {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self> {
        validate(s)
    }
}

/// Validate a raw recipient string.
///
/// Surrounding whitespace is ignored; anything else that does not match the
/// grammar in the module documentation is rejected with a specific reason.
///
/// # Errors
///
/// Returns the first [`AddressError`] encountered.
pub fn validate(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    if trimmed.len() > MAX_ADDRESS {
        return Err(AddressError::TooLong);
    }

    let mut parts = trimmed.split('@');
    let (Some(local_part), Some(domain)) = (parts.next(), parts.next()) else {
        return Err(AddressError::MissingAtSign);
    };
    if parts.next().is_some() {
        return Err(AddressError::MultipleAtSigns);
    }

    if trimmed.contains("..") {
        return Err(AddressError::ConsecutiveDots);
    }

    validate_local_part(local_part)?;
    validate_domain(domain)?;

    Ok(Mailbox {
        local_part: local_part.to_string(),
        domain: domain.to_ascii_lowercase(),
    })
}

/// Returns `true` if `input` is a syntactically acceptable recipient.
#[must_use]
pub fn is_valid(input: &str) -> bool {
    validate(input).is_ok()
}

fn validate_local_part(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::EmptyLocalPart);
    }

    if input.len() > MAX_LOCAL_PART {
        return Err(AddressError::LocalPartTooLong);
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "cannot start or end with '.'".to_string(),
        ));
    }

    if let Some(ch) = input.chars().find(|&ch| !is_local_char(ch)) {
        return Err(AddressError::InvalidLocalPart(format!(
            "invalid character '{ch}'"
        )));
    }

    Ok(())
}

fn validate_domain(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::EmptyDomain);
    }

    if input.len() > MAX_DOMAIN {
        return Err(AddressError::DomainTooLong);
    }

    if !input.contains('.') {
        return Err(AddressError::MissingDomainDot);
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "cannot start or end with '.'".to_string(),
        ));
    }

    let labels: Vec<&str> = input.split('.').collect();
    for label in &labels {
        if label.starts_with('-') || label.ends_with('-') {
            return Err(AddressError::InvalidDomain(format!(
                "label '{label}' cannot start or end with '-'"
            )));
        }

        if let Some(ch) = label
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-'))
        {
            return Err(AddressError::InvalidDomain(format!(
                "invalid character '{ch}'"
            )));
        }
    }

    // `labels` always has at least two entries here: the domain contains a
    // dot and neither starts nor ends with one.
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(AddressError::InvalidDomain(format!(
            "top-level label '{tld}' must be at least two letters"
        )));
    }

    Ok(())
}

const fn is_local_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '%' | '+' | '-')
}
