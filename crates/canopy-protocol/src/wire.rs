//! Value codecs: how typed payloads become body-frame bytes.
//!
//! Two interchangeable families exist. The compact binary family is
//! big-endian fixed-width bincode; the self-describing family is JSON.
//! Peers pin a family through the handshake magic, so a connection never
//! mixes them.

use bincode::Options as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};

/// Upper bound on a single body frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// A codec family for body payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// Compact binary: big-endian, fixed-width integers, length-prefixed
    /// byte strings.
    Binary,
    /// Self-describing JSON, for tooling and debugging.
    Json,
}

fn binary_options() -> impl bincode::Options {
    bincode::options()
        .with_big_endian()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_SIZE as u64)
}

impl WireFormat {
    /// Encode a value to payload bytes.
    pub fn encode<T: Serialize>(&self, value: &T) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::Binary => binary_options()
                .serialize(value)
                .map_err(|e| ProtocolError::Serialization(e.to_string())),
            Self::Json => {
                serde_json::to_vec(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
            }
        }
    }

    /// Decode a value from payload bytes.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> ProtocolResult<T> {
        match self {
            Self::Binary => binary_options()
                .deserialize(bytes)
                .map_err(|e| ProtocolError::Deserialization(e.to_string())),
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| ProtocolError::Deserialization(e.to_string())),
        }
    }
}
