//! Streaming codecs for both ends of a connection.
//!
//! Both decoders look at the header byte first and compute the full frame
//! length for that action. Until that many bytes are buffered they return
//! `Ok(None)` without consuming anything, so a frame split across any number
//! of socket reads decodes exactly like one delivered whole.

use crate::action::{Action, FrameHeader};
use crate::error::{ProtocolError, Result};
use crate::frame::{Request, Response};
use crate::{KEY_LEN, LENGTH_PREFIX_LEN, RESERVED_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Largest payload a client accepts in a single response.
///
/// INIT responses carry the whole index log, so this is deliberately far
/// above the read block size.
pub const DEFAULT_MAX_PAYLOAD: usize = 1 << 30;

/// Server side: decodes [`Request`]s, encodes [`Response`]s.
#[derive(Debug, Clone)]
pub struct ServerCodec {
    value_len: usize,
}

impl ServerCodec {
    /// Create a codec for values of exactly `value_len` bytes.
    pub const fn new(value_len: usize) -> Self {
        Self { value_len }
    }

    /// Full encoded length of a request carrying `action`.
    pub const fn request_len(&self, action: Action) -> usize {
        match action {
            Action::Init | Action::Flush | Action::Close => 1,
            Action::Read => 1 + RESERVED_LEN + 8,
            Action::Set => 1 + RESERVED_LEN + KEY_LEN + self.value_len,
        }
    }
}

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>> {
        loop {
            let Some(&byte) = src.first() else {
                return Ok(None);
            };
            let header = FrameHeader::from_byte(byte);
            let Some(action) = header.action() else {
                // Unknown actions get no response; skip the header byte and
                // keep the connection going.
                warn!("Dropping frame with unknown action: {header}");
                src.advance(1);
                continue;
            };

            let frame_len = self.request_len(action);
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            let mut frame = src.split_to(frame_len);
            frame.advance(1);
            let instance = header.instance();

            let request = match action {
                Action::Init => Request::Init { instance },
                Action::Flush => Request::Flush { instance },
                Action::Close => Request::Close { instance },
                Action::Read => {
                    frame.advance(RESERVED_LEN);
                    Request::Read {
                        instance,
                        offset: frame.get_u64_le(),
                    }
                }
                Action::Set => {
                    frame.advance(RESERVED_LEN);
                    let key = frame.get_u64_le();
                    Request::Set {
                        instance,
                        key,
                        value: frame.freeze(),
                    }
                }
            };
            return Ok(Some(request));
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<()> {
        let header = item.header()?;
        match item {
            Response::Ack(_) => dst.put_u8(header.as_byte()),
            Response::Index { keys: payload, .. } | Response::Block { data: payload, .. } => {
                put_length_prefixed(header, &payload, dst)?;
            }
        }
        Ok(())
    }
}

/// Client side: encodes [`Request`]s, decodes [`Response`]s.
#[derive(Debug, Clone)]
pub struct ClientCodec {
    value_len: usize,
    max_payload: usize,
}

impl ClientCodec {
    /// Create a codec for values of exactly `value_len` bytes.
    pub const fn new(value_len: usize) -> Self {
        Self {
            value_len,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Limit the payload size accepted in one response.
    #[must_use]
    pub const fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        let header = item.header()?;
        match item {
            Request::Init { .. } | Request::Flush { .. } | Request::Close { .. } => {
                dst.put_u8(header.as_byte());
            }
            Request::Read { offset, .. } => {
                dst.reserve(1 + RESERVED_LEN + 8);
                dst.put_u8(header.as_byte());
                dst.put_bytes(0, RESERVED_LEN);
                dst.put_u64_le(offset);
            }
            Request::Set { key, value, .. } => {
                if value.len() != self.value_len {
                    return Err(ProtocolError::InvalidValueLength {
                        expected: self.value_len,
                        actual: value.len(),
                    });
                }
                dst.reserve(1 + RESERVED_LEN + KEY_LEN + value.len());
                dst.put_u8(header.as_byte());
                dst.put_bytes(0, RESERVED_LEN);
                dst.put_u64_le(key);
                dst.put_slice(&value);
            }
        }
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        let Some(&byte) = src.first() else {
            return Ok(None);
        };
        let header = FrameHeader::from_byte(byte);
        let action = header
            .action()
            .ok_or(ProtocolError::UnexpectedResponse(byte))?;

        if !action.has_payload_response() {
            src.advance(1);
            return Ok(Some(Response::Ack(header)));
        }

        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[1 + RESERVED_LEN..LENGTH_PREFIX_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                len,
                limit: self.max_payload,
            });
        }

        let frame_len = LENGTH_PREFIX_LEN + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let payload: Bytes = src.split_to(len).freeze();
        let instance = header.instance();
        Ok(Some(match action {
            Action::Init => Response::Index {
                instance,
                keys: payload,
            },
            _ => Response::Block {
                instance,
                data: payload,
            },
        }))
    }
}

fn put_length_prefixed(header: FrameHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: payload.len(),
        limit: u32::MAX as usize,
    })?;
    dst.reserve(LENGTH_PREFIX_LEN + payload.len());
    dst.put_u8(header.as_byte());
    dst.put_bytes(0, RESERVED_LEN);
    dst.put_u32_le(len);
    dst.put_slice(payload);
    Ok(())
}
