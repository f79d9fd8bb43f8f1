//! SMTP transport and header configuration

use ahash::AHashMap;
use serde::Deserialize;

/// Connection-level settings for the pooled SMTP transport.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// `true` for implicit TLS (SMTPS, typically port 465); `false` for
    /// STARTTLS, which is then required before any mail command.
    #[serde(default)]
    pub implicit_tls: bool,

    /// Keep-alive connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,

    #[serde(default)]
    pub headers: HeaderConfig,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            implicit_tls: false,
            max_connections: default_max_connections(),
            timeouts: SmtpTimeouts::default(),
            headers: HeaderConfig::default(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    587
}

const fn default_max_connections() -> u32 {
    10
}

/// Timeout configuration for SMTP submissions.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for TCP connection establishment. Default: 15 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for the server greeting. Default: 10 seconds
    #[serde(default = "default_greeting_timeout")]
    pub greeting_secs: u64,

    /// Socket read/write timeout. Default: 30 seconds
    #[serde(default = "default_socket_timeout")]
    pub socket_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            greeting_secs: default_greeting_timeout(),
            socket_secs: default_socket_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    15
}

const fn default_greeting_timeout() -> u64 {
    10
}

const fn default_socket_timeout() -> u64 {
    30
}

impl SmtpTimeouts {
    /// Upper bound for one complete submission: connect, greet, and the
    /// whole mail transaction on the socket.
    #[must_use]
    pub const fn submission_secs(&self) -> u64 {
        self.connect_secs + self.greeting_secs + self.socket_secs
    }
}

/// Header values applied to every outgoing message.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderConfig {
    /// `From` header, either a bare address or `Display Name <address>`.
    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default)]
    pub reply_to: Option<String>,

    #[serde(default)]
    pub return_path: Option<String>,

    /// `List-Unsubscribe` target; when set, the one-click companion header
    /// is emitted as well.
    #[serde(default)]
    pub list_unsubscribe: Option<String>,

    #[serde(default = "default_x_mailer")]
    pub x_mailer: String,

    /// Arbitrary additional headers, emitted after the standard set.
    #[serde(default)]
    pub extra: AHashMap<String, String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            reply_to: None,
            return_path: None,
            list_unsubscribe: None,
            x_mailer: default_x_mailer(),
            extra: AHashMap::default(),
        }
    }
}

fn default_from() -> String {
    "no-reply@localhost".to_string()
}

fn default_x_mailer() -> String {
    "volley".to_string()
}

impl HeaderConfig {
    /// The bare address part of `from` (strips any display name).
    #[must_use]
    pub fn from_address(&self) -> &str {
        address_part(&self.from)
    }

    /// The domain of the `from` address, used to build `Message-ID`s.
    #[must_use]
    pub fn sender_domain(&self) -> &str {
        self.from_address()
            .rsplit_once('@')
            .map_or("localhost", |(_, host)| host)
    }
}

/// Extract the addr-spec from a mailbox that may carry a display name.
#[must_use]
pub fn address_part(mailbox: &str) -> &str {
    match (mailbox.find('<'), mailbox.rfind('>')) {
        (Some(start), Some(end)) if start < end => mailbox[start + 1..end].trim(),
        _ => mailbox.trim(),
    }
}
