#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

//! SMTP transport seam
//!
//! The delivery engine talks to SMTP through the [`MailTransport`] trait.
//! The production implementation is a pooled, TLS-enforcing `lettre`
//! transport; the engine renders raw RFC 5322 bytes itself (see
//! [`message`]) so it keeps full control over headers.

pub mod config;
pub mod error;
pub mod message;
pub mod text;
pub mod transport;

pub use config::{HeaderConfig, SmtpConfig, SmtpTimeouts};
pub use error::TransportError;
pub use message::{generate_message_id, jittered_date, OutgoingMail};
pub use text::html_to_text;
pub use transport::{MailEnvelope, MailTransport, SmtpPool};
