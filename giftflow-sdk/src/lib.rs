//! Shared types for the Giftflow donation service.
//!
//! - [`objects`]: request/response bodies of the Service API
//! - [`signature`]: HMAC-SHA256 request signing used by the Service API and
//!   by the provider callback schemes

pub mod objects;
pub mod signature;
