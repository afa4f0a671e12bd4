//! Wire protocol for Canopy.
//!
//! Defines the codec families, frame layout, handshake, command names, and
//! request/response payload types used between Canopy clients and servers.
//! The protocol is framed binary: a request is a command-name header
//! followed by one body frame; a response is a status byte followed by a
//! body frame (ok), an error message (error), or a pushed branch event
//! (watch notification).

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod messages;
pub mod wire;

pub use connection::{
    BoxedStream, Connection, FrameReader, FrameWriter, STATUS_ERROR, STATUS_OK, STATUS_PUSH,
};
pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::{ProtocolError, ProtocolResult};
pub use handshake::{accept, initiate, VERSION_MAGIC_V1};
pub use wire::{WireFormat, MAX_FRAME_SIZE};
