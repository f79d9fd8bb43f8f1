//! Domain newtype for type safety
//!
//! Wraps domain strings so email addresses cannot be passed where a
//! recipient domain is expected. Rate-limit state is keyed on this type.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Key used for recipients whose address has no parseable host part.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// A lower-cased recipient domain.
///
/// `#[repr(transparent)]` keeps this a zero-cost wrapper around `Arc<str>`,
/// cheap to clone into per-task state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    /// Derive the domain from a recipient address: the lower-cased substring
    /// after the last `'@'`. Missing or empty host parts map to
    /// [`UNKNOWN_DOMAIN`], which carries the default per-minute limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use volley_common::Domain;
    ///
    /// assert_eq!(Domain::of_recipient("User@Gmail.COM").as_str(), "gmail.com");
    /// assert_eq!(Domain::of_recipient("not-an-address").as_str(), "unknown");
    /// ```
    #[must_use]
    pub fn of_recipient(recipient: &str) -> Self {
        match recipient.trim().rsplit_once('@') {
            Some((_, host)) if !host.is_empty() => Self::new(host.to_ascii_lowercase()),
            _ => Self::new(UNKNOWN_DOMAIN),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}
