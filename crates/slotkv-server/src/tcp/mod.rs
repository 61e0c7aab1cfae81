//! TCP transport for the slotkv binary protocol.

use crate::error::ServerError;
use crate::partition::PartitionRegistry;
use futures::{SinkExt, StreamExt};
use slotkv_protocol::ServerCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub mod handlers;

/// Bind `bind_addr` and serve connections until the task is aborted.
///
/// # Errors
///
/// Returns `ServerError` if the server fails to bind or encounters a fatal error.
pub async fn start_server(
    bind_addr: SocketAddr,
    registry: Arc<PartitionRegistry>,
) -> Result<(), ServerError> {
    let listener =
        TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::TcpBindFailed {
                addr: bind_addr,
                source,
            })?;

    tracing::info!("TCP server listening on {bind_addr}");
    serve(listener, registry).await
}

/// Accept connections on an already bound listener.
///
/// # Errors
///
/// Returns `ServerError` if accepting a connection fails.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<PartitionRegistry>,
) -> Result<(), ServerError> {
    loop {
        let (socket, addr) = listener
            .accept()
            .await
            .map_err(|e| ServerError::Shutdown(format!("Failed to accept TCP connection: {e}")))?;

        let registry = registry.clone();

        // Spawn a task for each connection
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, registry).await {
                tracing::warn!("TCP connection from {addr} failed: {e}");
            }
        });
    }
}

/// Handle a single TCP connection.
///
/// Requests are answered in order until the client disconnects. A request
/// that fails in its partition closes the connection, since the protocol has
/// no error response.
///
/// # Errors
///
/// Returns `ServerError` if framing or request execution fails.
async fn handle_connection(
    socket: TcpStream,
    registry: Arc<PartitionRegistry>,
) -> Result<(), ServerError> {
    let addr = socket.peer_addr()?;
    socket.set_nodelay(true)?;
    tracing::info!("Accepted TCP connection from {addr}");

    let codec = ServerCodec::new(registry.config().value_len);
    let mut framed = Framed::new(socket, codec);

    while let Some(request) = framed.next().await {
        let request = request?;
        if let Some(response) = handlers::handle_request(&registry, request).await? {
            framed.send(response).await?;
        }
    }

    tracing::info!("TCP connection closed by client: {addr}");
    Ok(())
}
