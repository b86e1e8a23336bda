//! API Module
//!
//! Request shapes handed to the pipeline and response shapes it consumes.

pub mod rate_limit;
pub mod request;

pub use rate_limit::RateLimitBody;
pub use request::{FileAttachment, Method, Request};
