#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod clock;
pub mod deadline;
pub mod domain;
pub mod logging;

pub use clock::now_unix_ms;
pub use deadline::{Deadline, DeadlineExpired};
pub use domain::Domain;

pub use tracing;
