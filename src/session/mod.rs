//! Session management
//!
//! A session is the per-connection unit of work: it follows the connect,
//! createStream, publish and close sequence and owns the recording file.

pub mod context;
pub mod ingest;
pub mod recording;
pub mod state;
pub mod stream;

pub use context::{ConnectInfo, SessionContext};
pub use ingest::Session;
pub use recording::Recording;
pub use state::{SessionPhase, SessionState};
pub use stream::RecordingStats;
