//! flv-ingest: record RTMP publish sessions to FLV files
//!
//! The RTMP transport (handshake, chunk stream, command dispatch) is external.
//! It reports each connection's events to an [`IngestHandler`]; this crate
//! turns them into one FLV file per published stream:
//! - AMF0 script data, audio and video tags re-encoded byte for byte
//! - Stream names mapped to files that cannot escape the output directory
//! - Key H.264 frames optionally rewritten by a [`FrameTransform`], falling
//!   back to the original frame on any failure
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use flv_ingest::{IngestHandler, Recorder, RecorderConfig};
//! use flv_ingest::session::ConnectInfo;
//!
//! fn main() -> flv_ingest::Result<()> {
//!     let recorder = Recorder::new(RecorderConfig::with_base_dir("received"));
//!
//!     let mut session = recorder.session()?;
//!     session.on_connect(&ConnectInfo::new("live"))?;
//!     session.on_create_stream()?;
//!     session.on_publish("stream1")?;
//!     session.on_video(0, Bytes::from_static(&[0x17, 0x01, 0, 0, 0, 0, 0, 0, 1, 0x65]))?;
//!     session.on_close()?;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod error;
pub mod media;
pub mod server;
pub mod session;
pub mod storage;
pub mod transform;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use server::config::RecorderConfig;
pub use server::handler::IngestHandler;
pub use server::recorder::{Recorder, SessionHandle};
pub use session::Session;
pub use transform::{FrameTransform, KeyframeStage};
