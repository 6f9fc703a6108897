#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod entities;
pub mod error;
pub mod framework;
pub mod phone;
pub mod processors;
pub mod providers;
pub mod status;
pub mod store;
