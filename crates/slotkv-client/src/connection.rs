//! One request/response connection to a server partition.

use crate::block_cache::BlockSource;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use slotkv_protocol::{Action, ClientCodec, FrameHeader, Request, Response};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;

/// Framed TCP connection bound to one partition.
///
/// Requests are strictly sequential: each call sends one frame and waits for
/// its response before returning.
#[derive(Debug)]
pub struct Connection {
    framed: Framed<TcpStream, ClientCodec>,
    instance: u8,
    timeout: Duration,
}

impl Connection {
    /// Connect to `addr` for partition `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the connection fails and
    /// [`ClientError::Timeout`] if it does not complete within `wait`.
    pub async fn connect(addr: &str, instance: u8, value_len: usize, wait: Duration) -> Result<Self> {
        let socket = timeout(wait, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(wait))?
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        socket.set_nodelay(true).map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        debug!("Connected to {} for partition {}", addr, instance);

        Ok(Self {
            framed: Framed::new(socket, ClientCodec::new(value_len)),
            instance,
            timeout: wait,
        })
    }

    /// Partition this connection talks to.
    pub const fn instance(&self) -> u8 {
        self.instance
    }

    /// Send INIT and return the index response.
    pub async fn init(&mut self) -> Result<Response> {
        let response = self.request(Request::Init { instance: self.instance }).await?;
        self.expect(&response, Action::Init)?;
        Ok(response)
    }

    /// Send SET and wait for the acknowledgement.
    pub async fn set(&mut self, key: u64, value: Bytes) -> Result<()> {
        let request = Request::Set {
            instance: self.instance,
            key,
            value,
        };
        let response = self.request(request).await?;
        self.expect(&response, Action::Set)
    }

    /// Send READ for the block starting at `offset`.
    pub async fn read(&mut self, offset: u64) -> Result<Bytes> {
        let request = Request::Read {
            instance: self.instance,
            offset,
        };
        match self.request(request).await? {
            Response::Block { instance, data } if instance == self.instance => Ok(data),
            other => Err(self.mismatch(&other, Action::Read)),
        }
    }

    /// Send FLUSH and wait for the acknowledgement.
    pub async fn flush(&mut self) -> Result<()> {
        let response = self.request(Request::Flush { instance: self.instance }).await?;
        self.expect(&response, Action::Flush)
    }

    /// Send CLOSE and wait for the acknowledgement.
    pub async fn close(&mut self) -> Result<()> {
        let response = self.request(Request::Close { instance: self.instance }).await?;
        self.expect(&response, Action::Close)
    }

    async fn request(&mut self, request: Request) -> Result<Response> {
        let wait = self.timeout;
        timeout(wait, self.framed.send(request))
            .await
            .map_err(|_| ClientError::Timeout(wait))??;

        match timeout(wait, self.framed.next()).await {
            Err(_) => Err(ClientError::Timeout(wait)),
            Ok(None) => Err(ClientError::ConnectionClosed),
            Ok(Some(response)) => Ok(response?),
        }
    }

    fn expect(&self, response: &Response, action: Action) -> Result<()> {
        match response.header() {
            Ok(header) if header.instance() == self.instance && header.action() == Some(action) => {
                Ok(())
            }
            _ => Err(self.mismatch(response, action)),
        }
    }

    fn mismatch(&self, response: &Response, action: Action) -> ClientError {
        let expected = FrameHeader::new(self.instance, action)
            .unwrap_or_else(|_| FrameHeader::from_byte(action.code()));
        let actual = response
            .header()
            .unwrap_or_else(|_| FrameHeader::from_byte(0));
        ClientError::UnexpectedResponse { expected, actual }
    }
}

#[async_trait]
impl BlockSource for Connection {
    async fn fetch_block(&mut self, offset: u64) -> Result<Bytes> {
        self.read(offset).await
    }
}
