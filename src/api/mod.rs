//! High-level, strongly-typed interface over a running connection.

pub mod catalog;
pub mod client;
pub mod types;

pub use catalog::ResourceCatalog;
pub use client::Hal;
pub use types::Rgb;
