#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

//! volley: a bulk email delivery engine
//!
//! Drains a message queue of email-send requests and relays them to SMTP
//! at high throughput without tripping provider rate limits or losing
//! messages. This crate wires the pieces together: configuration,
//! component construction, and the two entry points (deadline-bounded
//! drain and event-driven batch processing).

pub mod config;
pub mod engine;
pub mod seed;

pub use config::{Config, QueueConfig};
pub use engine::Engine;
