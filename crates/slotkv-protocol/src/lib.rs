//! Wire protocol shared by the slotkv client and server.
//!
//! Every frame starts with a single header byte: the high nibble carries the
//! partition (instance) id, the low nibble the action code. All integers are
//! little-endian and there is no version field.
//!
//! | Action | Request                                   | Response                                  |
//! |--------|-------------------------------------------|-------------------------------------------|
//! | INIT   | header                                    | header, 3 reserved, u32 len, index bytes  |
//! | SET    | header, 3 reserved, u64 key, value bytes  | header                                    |
//! | FLUSH  | header                                    | header                                    |
//! | CLOSE  | header                                    | header                                    |
//! | READ   | header, 3 reserved, u64 offset            | header, 3 reserved, u32 len, block bytes  |
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use slotkv_protocol::{ClientCodec, Request, ServerCodec};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut client = ClientCodec::new(8);
//! let mut server = ServerCodec::new(8);
//!
//! let mut wire = BytesMut::new();
//! let request = Request::Read { instance: 3, offset: 4096 };
//! client.encode(request.clone(), &mut wire).unwrap();
//!
//! assert_eq!(server.decode(&mut wire).unwrap(), Some(request));
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod action;
pub mod codec;
pub mod error;
pub mod frame;

pub use action::{Action, FrameHeader};
pub use codec::{ClientCodec, ServerCodec};
pub use error::{ProtocolError, Result};
pub use frame::{Request, Response};

/// Length of an encoded key.
pub const KEY_LEN: usize = 8;

/// Reserved padding bytes following the header in SET, READ and the
/// length-prefixed responses.
pub const RESERVED_LEN: usize = 3;

/// Size of the prefix in front of a length-prefixed payload
/// (header, reserved bytes, u32 length).
pub const LENGTH_PREFIX_LEN: usize = 1 + RESERVED_LEN + 4;

/// Default fixed value length.
pub const DEFAULT_VALUE_LEN: usize = 4 << 10;

/// Default size of a block served by READ.
pub const DEFAULT_READ_BLOCK_SIZE: usize = 1 << 20;

/// Number of instance ids addressable by the header nibble.
pub const MAX_INSTANCES: usize = 16;

/// Default server port.
pub const DEFAULT_PORT: u16 = 9571;
