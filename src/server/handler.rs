//! Transport boundary
//!
//! The RTMP transport (handshake, chunking, command dispatch) lives outside
//! this crate. It drives an [`IngestHandler`] with one callback per
//! connection event, in arrival order.

use bytes::Bytes;

use crate::error::Result;
use crate::session::ConnectInfo;

/// Callbacks for one RTMP connection
///
/// Payloads are RTMP message bodies, which are FLV tag bodies. Timestamps
/// are RTMP message timestamps in milliseconds.
///
/// An `Err` from `on_connect` or `on_publish` means the command should be
/// rejected. An `Err` from a media callback means the connection should be
/// dropped.
pub trait IngestHandler {
    /// connect command
    fn on_connect(&mut self, info: &ConnectInfo) -> Result<()>;

    /// createStream command
    fn on_create_stream(&mut self) -> Result<()>;

    /// publish command
    fn on_publish(&mut self, stream_name: &str) -> Result<()>;

    /// Data message (`@setDataFrame` / `onMetaData`)
    fn on_metadata(&mut self, timestamp: u32, payload: Bytes) -> Result<()>;

    fn on_audio(&mut self, timestamp: u32, payload: Bytes) -> Result<()>;

    fn on_video(&mut self, timestamp: u32, payload: Bytes) -> Result<()>;

    /// Connection closed (by either side)
    fn on_close(&mut self) -> Result<()>;
}
