//! Action codes and the single-byte frame header.

use crate::error::{ProtocolError, Result};
use crate::MAX_INSTANCES;
use std::fmt;

/// Operation carried by a frame.
///
/// Code 3 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Open the partition and return its index log
    Init = 1,
    /// Append one fixed-length value
    Set = 2,
    /// Force buffered writes to the data log
    Flush = 4,
    /// Flush and release the partition
    Close = 5,
    /// Read one block from the data log
    Read = 6,
}

impl Action {
    /// Numeric action code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode an action code, `None` for unassigned codes.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Init),
            2 => Some(Self::Set),
            4 => Some(Self::Flush),
            5 => Some(Self::Close),
            6 => Some(Self::Read),
            _ => None,
        }
    }

    /// Whether the response to this action carries a length-prefixed payload
    /// (as opposed to a bare header echo).
    pub const fn has_payload_response(self) -> bool {
        matches!(self, Self::Init | Self::Read)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Set => "SET",
            Self::Flush => "FLUSH",
            Self::Close => "CLOSE",
            Self::Read => "READ",
        };
        f.write_str(name)
    }
}

/// First byte of every frame: `instance << 4 | action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader(u8);

impl FrameHeader {
    /// Build a header for `instance`, which must be below 16.
    pub fn new(instance: u8, action: Action) -> Result<Self> {
        if instance as usize >= MAX_INSTANCES {
            return Err(ProtocolError::InstanceOutOfRange(instance));
        }
        Ok(Self((instance << 4) | action.code()))
    }

    /// Wrap a raw header byte as received from the wire.
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw header byte.
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Partition id in the high nibble.
    pub const fn instance(self) -> u8 {
        self.0 >> 4
    }

    /// Raw action code in the low nibble.
    pub const fn action_code(self) -> u8 {
        self.0 & 0x0F
    }

    /// Decoded action, `None` for unassigned codes.
    pub const fn action(self) -> Option<Action> {
        Action::from_code(self.action_code())
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action() {
            Some(action) => write!(f, "{action}@{}", self.instance()),
            None => write!(f, "?{}@{}", self.action_code(), self.instance()),
        }
    }
}
