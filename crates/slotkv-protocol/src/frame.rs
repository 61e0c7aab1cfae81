//! Decoded request and response frames.

use crate::action::{Action, FrameHeader};
use crate::error::Result;
use bytes::Bytes;

/// A client request addressed to one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open the partition and fetch its index log
    Init {
        /// Target partition
        instance: u8,
    },
    /// Append a value under `key`
    Set {
        /// Target partition
        instance: u8,
        /// Numeric key
        key: u64,
        /// Fixed-length value bytes
        value: Bytes,
    },
    /// Read one block starting at a byte offset of the data log
    Read {
        /// Target partition
        instance: u8,
        /// Byte offset of the block
        offset: u64,
    },
    /// Force buffered writes
    Flush {
        /// Target partition
        instance: u8,
    },
    /// Flush and release the partition
    Close {
        /// Target partition
        instance: u8,
    },
}

impl Request {
    /// Partition the request is addressed to.
    pub const fn instance(&self) -> u8 {
        match self {
            Self::Init { instance }
            | Self::Set { instance, .. }
            | Self::Read { instance, .. }
            | Self::Flush { instance }
            | Self::Close { instance } => *instance,
        }
    }

    /// Action code of the request.
    pub const fn action(&self) -> Action {
        match self {
            Self::Init { .. } => Action::Init,
            Self::Set { .. } => Action::Set,
            Self::Read { .. } => Action::Read,
            Self::Flush { .. } => Action::Flush,
            Self::Close { .. } => Action::Close,
        }
    }

    /// Header byte the request is sent with.
    pub fn header(&self) -> Result<FrameHeader> {
        FrameHeader::new(self.instance(), self.action())
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Header echo acknowledging SET, FLUSH or CLOSE
    Ack(FrameHeader),
    /// Index log content answering INIT: the keys in slot order, 8 bytes
    /// each, little-endian
    Index {
        /// Responding partition
        instance: u8,
        /// Raw key records
        keys: Bytes,
    },
    /// Block answering READ, shorter than requested at the end of the log
    Block {
        /// Responding partition
        instance: u8,
        /// Raw block bytes
        data: Bytes,
    },
}

impl Response {
    /// Header byte the response carries.
    pub fn header(&self) -> Result<FrameHeader> {
        match self {
            Self::Ack(header) => Ok(*header),
            Self::Index { instance, .. } => FrameHeader::new(*instance, Action::Init),
            Self::Block { instance, .. } => FrameHeader::new(*instance, Action::Read),
        }
    }

    /// Iterate the keys of an INIT response in slot order.
    ///
    /// Yields nothing for other responses. A trailing partial record is
    /// ignored.
    pub fn index_keys(&self) -> impl Iterator<Item = u64> + '_ {
        let keys: &[u8] = match self {
            Self::Index { keys, .. } => keys,
            _ => &[],
        };
        keys.chunks_exact(crate::KEY_LEN).map(|record| {
            let mut raw = [0u8; crate::KEY_LEN];
            raw.copy_from_slice(record);
            u64::from_le_bytes(raw)
        })
    }
}
