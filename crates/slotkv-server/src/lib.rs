//! slotkv storage server.
//!
//! Serves up to 16 independent partitions over one TCP port using the
//! binary protocol from `slotkv-protocol`. Each partition is a
//! `slotkv-storage` engine owned by a dedicated worker thread.
//!
//! # Architecture
//!
//! - `server`: orchestration (startup, listener, shutdown)
//! - `config`: configuration loading and validation
//! - `partition`: registry of partition workers
//! - `tcp`: accept loop, per-connection framing and request routing
//!
//! # Example
//!
//! ```no_run
//! use slotkv_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let config = ServerConfig::from_args();
//!     config.validate()?;
//!
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Module declarations
pub mod config;
pub mod error;
pub mod partition;
pub mod server;
pub mod tcp;

// Re-exports for public API
pub use config::ServerConfig;
pub use error::{ConfigError, ServerError};
pub use partition::{PartitionHandle, PartitionRegistry};
pub use server::Server;
