//! Table and column identifiers
//!
//! Column names come straight from feed file headers, so they are untrusted. They
//! are validated against an `IdentifierPolicy` and always emitted double-quoted
//! with embedded quotes doubled; they never reach SQL text any other way.

use serde::{Deserialize, Serialize};

use crate::{FeedloadError, Result};

/// Longest identifier accepted from a feed
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Which identifiers are accepted from untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Only `[A-Za-z_][A-Za-z0-9_]*`
    Strict,
    /// Any non-empty name without NUL or control characters; emitted escaped
    #[default]
    Quoted,
}

/// A validated SQL identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    name: String,
}

impl Identifier {
    /// Validate `name` under `policy`
    pub fn parse(name: &str, policy: IdentifierPolicy) -> Result<Self> {
        let reject = |reason: &str| FeedloadError::Identifier {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("identifier is empty"));
        }
        if name.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(reject("identifier is too long"));
        }
        if name.chars().any(char::is_control) {
            return Err(reject("identifier contains control characters"));
        }

        if policy == IdentifierPolicy::Strict && !is_plain(name) {
            return Err(reject(
                "only ASCII letters, digits and '_' are allowed, and it may not start with a digit",
            ));
        }

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// The identifier as written in the source
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Double-quoted form with embedded quotes escaped
    pub fn quoted(&self) -> String {
        quote_identifier(&self.name)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Quote an identifier for SQLite
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
