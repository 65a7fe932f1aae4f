//! Recorder front end
//!
//! [`IngestHandler`] is the boundary the RTMP transport calls into.
//! [`Recorder`] builds sessions that implement it.

pub mod config;
pub mod handler;
pub mod recorder;

pub use config::RecorderConfig;
pub use handler::IngestHandler;
pub use recorder::{Recorder, SessionHandle};
