//! Partition registry and worker threads.
//!
//! Every partition engine is owned by one named OS thread. Connection tasks
//! send decoded requests to the owning thread over a channel and await the
//! response, so blocking file I/O never stalls the async runtime or another
//! partition.

use crate::error::{ConfigError, ServerError};
use crate::tcp::handlers;
use slotkv_protocol::{Request, Response};
use slotkv_storage::{EngineConfig, StorageEngine, StorageError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Requests queued per partition before senders wait
const QUEUE_DEPTH: usize = 64;

enum Command {
    Request {
        request: Request,
        reply: oneshot::Sender<Result<Response, ServerError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
}

/// Handle to the worker owning one partition.
#[derive(Debug, Clone)]
pub struct PartitionHandle {
    instance: u8,
    tx: mpsc::Sender<Command>,
}

impl PartitionHandle {
    /// Partition id.
    pub const fn instance(&self) -> u8 {
        self.instance
    }

    /// Run `request` on the partition worker and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns the storage or protocol error raised while executing the
    /// request, or [`ServerError::PartitionStopped`] if the worker is gone.
    pub async fn call(&self, request: Request) -> Result<Response, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Request { request, reply })
            .await
            .map_err(|_| ServerError::PartitionStopped(self.instance))?;
        rx.await
            .map_err(|_| ServerError::PartitionStopped(self.instance))?
    }

    /// Close the engine and stop the worker.
    ///
    /// # Errors
    ///
    /// Returns the error raised while closing the engine, or
    /// [`ServerError::PartitionStopped`] if the worker is already gone.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| ServerError::PartitionStopped(self.instance))?;
        rx.await
            .map_err(|_| ServerError::PartitionStopped(self.instance))?
            .map_err(ServerError::from)
    }
}

/// Maps partition ids to the workers that own them.
#[derive(Debug)]
pub struct PartitionRegistry {
    config: Arc<EngineConfig>,
    partitions: Vec<PartitionHandle>,
}

impl PartitionRegistry {
    /// Start one worker per partition id in `0..count`.
    ///
    /// Engines are created closed and opened by the first INIT request.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if a worker thread cannot be spawned.
    pub fn start(config: Arc<EngineConfig>, count: usize) -> Result<Self, ServerError> {
        let mut partitions = Vec::with_capacity(count);
        for instance in 0..count {
            let instance = u8::try_from(instance).map_err(|_| ConfigError::InvalidValue {
                field: "partitions",
                reason: format!("partition id {instance} does not fit a frame header"),
            })?;
            partitions.push(spawn_worker(Arc::clone(&config), instance)?);
        }

        info!(
            "Started {} partition workers for {}",
            count,
            config.data_root.display()
        );
        Ok(Self { config, partitions })
    }

    /// Worker owning partition `instance`, if served.
    pub fn get(&self, instance: u8) -> Option<&PartitionHandle> {
        self.partitions.get(usize::from(instance))
    }

    /// Number of partitions served.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether no partition is served.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Engine configuration shared by every partition.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close every partition and stop the workers.
    ///
    /// A partition that fails to close is logged and the remaining
    /// partitions are still closed.
    pub async fn shutdown(&self) {
        for partition in &self.partitions {
            if let Err(e) = partition.shutdown().await {
                error!("Failed to close partition {}: {e}", partition.instance());
            }
        }
        info!("All partitions closed");
    }
}

fn spawn_worker(config: Arc<EngineConfig>, instance: u8) -> Result<PartitionHandle, ServerError> {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    std::thread::Builder::new()
        .name(format!("slotkv-partition-{instance}"))
        .spawn(move || run_worker(StorageEngine::new(config), instance, rx))
        .map_err(|source| ServerError::WorkerSpawnFailed { instance, source })?;
    Ok(PartitionHandle { instance, tx })
}

fn run_worker(mut engine: StorageEngine, instance: u8, mut rx: mpsc::Receiver<Command>) {
    debug!("Partition {instance} worker started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Request { request, reply } => {
                let result = handlers::execute(&mut engine, request);
                // The connection may have gone away while the request ran.
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(engine.close());
                debug!("Partition {instance} worker stopped");
                return;
            }
        }
    }

    // Every handle was dropped without a shutdown request.
    if let Err(e) = engine.close() {
        error!("Failed to close partition {instance}: {e}");
    }
    debug!("Partition {instance} worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use slotkv_protocol::FrameHeader;
    use tempfile::TempDir;

    fn registry(dir: &TempDir, count: usize) -> PartitionRegistry {
        let config = EngineConfig::new(dir.path())
            .with_value_len(8)
            .with_read_block_size(64)
            .with_direct_io(false);
        PartitionRegistry::start(Arc::new(config), count).unwrap()
    }

    #[tokio::test]
    async fn test_requests_reach_their_partition() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(2).is_none());

        let partition = registry.get(1).unwrap();
        let response = partition.call(Request::Init { instance: 1 }).await.unwrap();
        assert_eq!(
            response,
            Response::Index {
                instance: 1,
                keys: Bytes::new()
            }
        );

        let response = partition
            .call(Request::Set {
                instance: 1,
                key: 9,
                value: Bytes::from_static(b"abcdefgh"),
            })
            .await
            .unwrap();
        assert_eq!(response, Response::Ack(FrameHeader::from_byte(0x12)));

        registry.shutdown().await;
        assert!(dir.path().join("1_data").exists());
        assert!(!dir.path().join("0_data").exists());
    }

    #[tokio::test]
    async fn test_storage_errors_are_returned() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 1);
        let partition = registry.get(0).unwrap();

        let result = partition
            .call(Request::Read {
                instance: 0,
                offset: 0,
            })
            .await;
        assert!(matches!(
            result,
            Err(ServerError::Storage(StorageError::NotInitialized))
        ));
    }

    #[tokio::test]
    async fn test_stopped_partition() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 1);
        registry.shutdown().await;

        let result = registry
            .get(0)
            .unwrap()
            .call(Request::Flush { instance: 0 })
            .await;
        assert!(matches!(result, Err(ServerError::PartitionStopped(0))));
    }
}
