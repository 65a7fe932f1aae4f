//! Recorder configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::media::container::FlvFlags;
use crate::storage::PathResolver;

/// Recorder configuration options
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory recordings are written to
    pub base_dir: PathBuf,

    /// Recording file extension, without the dot
    pub extension: String,

    /// Capability flags written to every file header
    pub flags: FlvFlags,

    /// Buffer between the writer and the file
    pub write_buffer_size: usize,

    /// Route key frames through the frame transform
    pub transform_enabled: bool,

    /// Upper bound for one transform call (None = unbounded)
    pub transform_timeout: Option<Duration>,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,

    /// Callbacks buffered per spawned session before senders wait
    pub queue_depth: usize,

    /// Reject publish with an empty stream name
    pub require_stream_name: bool,

    /// Log tags whose timestamp goes backwards
    pub validate_timestamps: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("received"),
            extension: "flv".to_string(),
            flags: FlvFlags::AUDIO_VIDEO,
            write_buffer_size: 64 * 1024, // 64KB
            transform_enabled: true,
            transform_timeout: None,
            max_sessions: 0, // Unlimited
            queue_depth: 256,
            require_stream_name: false,
            validate_timestamps: false,
        }
    }
}

impl RecorderConfig {
    /// Create a new config writing under `dir`
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn flags(mut self, flags: FlvFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Record every key frame as received
    pub fn disable_transform(mut self) -> Self {
        self.transform_enabled = false;
        self
    }

    pub fn transform_timeout(mut self, timeout: Duration) -> Self {
        self.transform_timeout = Some(timeout);
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the per-session callback queue depth (at least 1)
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn require_stream_name(mut self, required: bool) -> Self {
        self.require_stream_name = required;
        self
    }

    pub fn validate_timestamps(mut self, enabled: bool) -> Self {
        self.validate_timestamps = enabled;
        self
    }

    /// Path resolver for this configuration
    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(&self.base_dir, &self.extension)
    }
}
