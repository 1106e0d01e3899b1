#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod client;
pub mod company;
pub mod config;
pub mod economics;
pub mod endpoint;
pub mod error;
pub mod forex;
pub mod frequency;
pub mod ownership;
pub mod reshape;
pub mod session;

pub use cache::TableStore;
pub use client::HttpTransport;
pub use config::Config;
pub use error::{DataError, Result};
pub use session::Session;

/// Data crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
