//! Pooled SMTP transport
//!
//! [`SmtpPool`] wraps a `lettre` async transport with keep-alive pooling
//! and TLS (implicit or required STARTTLS, never opportunistic). The
//! engine hands it pre-rendered message bytes; the transport owns only
//! the wire.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        PoolConfig,
    },
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};

use crate::{
    config::{SmtpConfig, SmtpTimeouts},
    error::TransportError,
};

/// Envelope addresses for one submission.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    pub from: String,
    pub to: String,
}

/// The seam between the delivery engine and SMTP.
///
/// Implementations submit pre-rendered message bytes and surface failures
/// as [`TransportError`], keeping SMTP reply codes intact for the
/// classifier.
#[async_trait]
pub trait MailTransport: Send + Sync + fmt::Debug {
    async fn submit(&self, envelope: &MailEnvelope, raw_message: &[u8])
        -> Result<(), TransportError>;
}

/// Production transport: pooled `lettre` client over TLS.
pub struct SmtpPool {
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    submission_timeout: Duration,
}

impl fmt::Debug for SmtpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpPool").field("host", &self.host).finish()
    }
}

impl SmtpPool {
    /// Build the pooled transport from configuration. No connection is
    /// opened until the first submission.
    pub fn connect(config: &SmtpConfig) -> Result<Self, TransportError> {
        let tls_parameters = TlsParameters::new(config.host.clone())
            .map_err(|e| TransportError::Config(format!("tls parameters: {e}")))?;
        let tls = if config.implicit_tls {
            Tls::Wrapper(tls_parameters)
        } else {
            // STARTTLS is mandatory; a server without it fails the send
            Tls::Required(tls_parameters)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| TransportError::Config(format!("relay {}: {e}", config.host)))?
            .port(config.port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(config.timeouts.socket_secs)))
            .pool_config(PoolConfig::new().max_size(config.max_connections));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            host: config.host.clone(),
            transport: builder.build(),
            submission_timeout: submission_timeout(&config.timeouts),
        })
    }
}

fn submission_timeout(timeouts: &SmtpTimeouts) -> Duration {
    Duration::from_secs(timeouts.submission_secs())
}

fn parse_address(address: &str) -> Result<Address, TransportError> {
    address
        .parse::<Address>()
        .map_err(|e| TransportError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl MailTransport for SmtpPool {
    async fn submit(
        &self,
        envelope: &MailEnvelope,
        raw_message: &[u8],
    ) -> Result<(), TransportError> {
        tracing::debug!(
            to = %envelope.to,
            host = %self.host,
            bytes = raw_message.len(),
            "submitting message"
        );

        let from = parse_address(&envelope.from)?;
        let to = parse_address(&envelope.to)?;
        let envelope = Envelope::new(Some(from), vec![to]).map_err(|e| TransportError::Address {
            address: String::new(),
            reason: e.to_string(),
        })?;

        let send = self.transport.send_raw(&envelope, raw_message);
        match tokio::time::timeout(self.submission_timeout, send).await {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::from_lettre(&e)),
            Err(_) => Err(TransportError::Timeout(format!(
                "submission to {} exceeded {:?}",
                self.host, self.submission_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_builds_without_network() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            ..SmtpConfig::default()
        };
        let pool = SmtpPool::connect(&config).unwrap();
        assert_eq!(pool.host, "smtp.example.com");
        assert_eq!(pool.submission_timeout, Duration::from_secs(55));
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        let err = parse_address("not an address").unwrap_err();
        assert!(matches!(err, TransportError::Address { .. }));
    }
}
