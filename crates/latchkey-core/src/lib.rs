//! Core types for the Latchkey lockbox companion library.
//!
//! This crate holds what every other Latchkey crate shares: the error
//! taxonomy, validated domain newtypes (access codes, configuration keys,
//! MAC addresses), and the protocol-level constants. It performs no I/O.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{DeviceErrorKind, Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
