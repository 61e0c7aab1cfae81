//! Request routing and execution.

use crate::error::ServerError;
use crate::partition::PartitionRegistry;
use slotkv_protocol::{Request, Response};
use slotkv_storage::StorageEngine;

/// Route a decoded request to the partition that owns it.
///
/// Returns `None` for a request addressed to a partition this server does
/// not serve. Such requests are dropped without a response.
///
/// # Errors
///
/// Returns `ServerError` if the partition fails to execute the request.
pub async fn handle_request(
    registry: &PartitionRegistry,
    request: Request,
) -> Result<Option<Response>, ServerError> {
    let header = request.header()?;
    let Some(partition) = registry.get(request.instance()) else {
        tracing::warn!(
            "Dropping {header}: partition {} is not served ({} partitions)",
            request.instance(),
            registry.len()
        );
        return Ok(None);
    };

    tracing::debug!("Dispatching {header}");
    partition.call(request).await.map(Some)
}

/// Execute `request` against the engine of its partition.
///
/// Runs on the partition worker thread.
///
/// # Errors
///
/// Returns `ServerError` if the engine operation fails.
pub fn execute(engine: &mut StorageEngine, request: Request) -> Result<Response, ServerError> {
    let header = request.header()?;
    let response = match request {
        Request::Init { instance } => {
            engine.init(instance)?;
            Response::Index {
                instance,
                keys: engine.index_log()?,
            }
        }
        Request::Set { key, value, .. } => {
            engine.set(key, &value)?;
            Response::Ack(header)
        }
        Request::Read { instance, offset } => Response::Block {
            instance,
            data: engine.read(offset)?,
        },
        Request::Flush { .. } => {
            engine.flush()?;
            Response::Ack(header)
        }
        Request::Close { .. } => {
            engine.close()?;
            Response::Ack(header)
        }
    };
    Ok(response)
}
