//! Version negotiation, performed immediately after transport
//! establishment. No other traffic may precede it.
//!
//! Both peers write the protocol's version magic, flush, then read the
//! peer's. The acceptor closes the connection without further I/O on a
//! mismatch; the initiator sees that as a connection error. The magic also
//! pins the codec family for the connection.

use crate::connection::Connection;
use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::WireFormat;

/// Version magic for protocol v1: `"CNP1"`.
pub const VERSION_MAGIC_V1: u32 = 0x434e_5031;

/// The codec family a version magic pins, if the magic is known.
pub fn wire_format_of(magic: u32) -> Option<WireFormat> {
    match magic {
        VERSION_MAGIC_V1 => Some(WireFormat::Binary),
        _ => None,
    }
}

/// Client side: send our magic, require the peer's to match.
pub async fn initiate(conn: &mut Connection) -> ProtocolResult<WireFormat> {
    conn.write_u32(VERSION_MAGIC_V1).await?;
    conn.flush().await?;
    let remote = conn.read_u32().await?;
    if remote != VERSION_MAGIC_V1 {
        return Err(ProtocolError::VersionMismatch {
            local: VERSION_MAGIC_V1,
            remote,
        });
    }
    Ok(WireFormat::Binary)
}

/// Server side: send our magic, require the peer's to match.
///
/// On mismatch the caller must drop the connection without replying.
pub async fn accept(conn: &mut Connection) -> ProtocolResult<WireFormat> {
    conn.write_u32(VERSION_MAGIC_V1).await?;
    conn.flush().await?;
    let remote = conn.read_u32().await?;
    match wire_format_of(remote) {
        Some(format) => Ok(format),
        None => Err(ProtocolError::VersionMismatch {
            local: VERSION_MAGIC_V1,
            remote,
        }),
    }
}
