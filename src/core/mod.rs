//! Core types shared by the gateway protocol client
//!
//! This module contains the error type, startup configuration and the
//! addressing primitives used throughout the library.

use std::time::Duration;

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{Config, DeviceDescriptor};

/// Default host of the application server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of the application server
pub const DEFAULT_PORT: u16 = 5000;

/// Default delay before a reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);
