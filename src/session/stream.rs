//! Per-recording counters
//!
//! Updated on every callback of a publishing session and logged when the
//! session closes.

use crate::media::flv::FlvTagType;
use crate::transform::Outcome;

/// Counters for one recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub script_tags: u64,
    pub audio_tags: u64,
    pub video_tags: u64,
    pub keyframes: u64,

    /// Script tags that failed to decode and were skipped
    pub dropped_scripts: u64,

    /// Tags that failed to reach the file
    pub write_errors: u64,

    /// Keyframes replaced by the transform
    pub transformed: u64,

    /// Keyframes recorded unchanged after a transform failure
    pub transform_failures: u64,

    /// Video tags the transform did not apply to
    pub transform_bypassed: u64,

    /// Tags whose timestamp went backwards relative to the previous tag of
    /// the same type
    pub timestamp_regressions: u64,

    pub has_video_header: bool,
    pub has_audio_header: bool,
    pub has_metadata: bool,

    /// File size including header
    pub bytes_written: u64,

    last_script_ts: Option<u32>,
    last_audio_ts: Option<u32>,
    last_video_ts: Option<u32>,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags_written(&self) -> u64 {
        self.script_tags + self.audio_tags + self.video_tags
    }

    pub fn on_script(&mut self) {
        self.script_tags += 1;
        self.has_metadata = true;
    }

    pub fn on_audio(&mut self, is_header: bool) {
        self.audio_tags += 1;
        if is_header {
            self.has_audio_header = true;
        }
    }

    pub fn on_video(&mut self, is_keyframe: bool, is_header: bool, outcome: &Outcome) {
        self.video_tags += 1;
        if is_keyframe {
            self.keyframes += 1;
        }
        if is_header {
            self.has_video_header = true;
        }
        match outcome {
            Outcome::Transformed => self.transformed += 1,
            Outcome::FailedOpen(_) => self.transform_failures += 1,
            Outcome::Bypassed | Outcome::NotSampleData => self.transform_bypassed += 1,
        }
    }

    /// Record a timestamp; returns the previous one if this is a regression
    pub fn observe_timestamp(&mut self, tag_type: FlvTagType, timestamp: u32) -> Option<u32> {
        let last = match tag_type {
            FlvTagType::Script => &mut self.last_script_ts,
            FlvTagType::Audio => &mut self.last_audio_ts,
            FlvTagType::Video => &mut self.last_video_ts,
        };

        let previous = last.replace(timestamp);
        match previous {
            Some(prev) if timestamp < prev => {
                self.timestamp_regressions += 1;
                Some(prev)
            }
            _ => None,
        }
    }
}
