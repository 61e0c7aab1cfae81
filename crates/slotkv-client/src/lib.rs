//! Client for the slotkv storage server.
//!
//! A [`KvClient`] is bound to one server partition over one persistent
//! connection. It keeps the partition's key to slot index in memory
//! ([`IndexMap`]) and serves reads through a small LRU cache of large
//! blocks ([`BlockCache`]), so sequential reads of neighbouring slots cost
//! one round trip per block instead of one per value.
//!
//! # Example
//!
//! ```no_run
//! use slotkv_client::{ClientConfig, KvClient};
//!
//! # async fn example() -> slotkv_client::Result<()> {
//! let mut client = KvClient::new(ClientConfig::from_env()?)?;
//! client.init("data", 0).await?;
//!
//! client.set("42", vec![0x41u8; 4096]).await?;
//! assert!(client.get("42").await?.is_some());
//! assert!(client.get("43").await?.is_none());
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod block_cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod index_map;
pub mod key;

pub use block_cache::{BlockCache, BlockSource, CacheStats};
pub use client::KvClient;
pub use config::ClientConfig;
pub use connection::Connection;
pub use error::{ClientError, Result};
pub use index_map::IndexMap;
pub use key::parse_key;
