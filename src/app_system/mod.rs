//! Session orchestration, configuration, and tracing setup.

pub mod config;
pub mod session;
pub mod tracing;

pub use config::*;
pub use session::*;
pub use self::tracing::*;
