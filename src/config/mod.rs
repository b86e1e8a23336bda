//! Configuration Module
//!
//! Client settings and where they are loaded from.

pub mod loader;
pub mod options;

pub use loader::ConfigLoader;
pub use options::{BufferConfig, ClientConfig, RateLimitConfig, RetryConfig};
