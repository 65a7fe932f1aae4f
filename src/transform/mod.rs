//! Keyframe transform stage
//!
//! Key AVC samples can be routed through a pluggable [`FrameTransform`]
//! before they are written. The stage is fail-open: whatever goes wrong,
//! the original sample is recorded and the error is only reported back to
//! the caller as an [`Outcome`].
//!
//! ```text
//!  VideoData ──► key frame? ──► AVC? ──► NALU packet? ──► transform ──► re-encode
//!                   │ no          │ no        │ no             │ error
//!                   └─────────────┴───────────┴────────────────┴──► original bytes
//! ```

pub mod deadline;
pub mod raster;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::TransformError;
use crate::media::flv::{VideoCodec, VideoData};
use crate::media::h264::AvcPacket;

pub use deadline::Deadline;
pub use raster::{Identity, NaluPassthrough, Raster, RasterCodec, RasterPipeline, VisualTransform};

/// Pluggable per-sample transform
///
/// Receives the NAL unit payload of one key sample and returns the payload
/// to record instead. Implementations are shared between sessions, so they
/// must tolerate concurrent calls.
pub trait FrameTransform: Send + Sync {
    fn transform(&self, sample: Bytes, codec: VideoCodec) -> Result<Bytes, TransformError>;

    /// Like [`transform`](Self::transform), with the NALU length prefix width
    /// announced by the stream's decoder configuration record
    ///
    /// The default ignores the width.
    fn transform_framed(
        &self,
        sample: Bytes,
        codec: VideoCodec,
        nalu_length_size: u8,
    ) -> Result<Bytes, TransformError> {
        let _ = nalu_length_size;
        self.transform(sample, codec)
    }
}

impl<F> FrameTransform for F
where
    F: Fn(Bytes, VideoCodec) -> Result<Bytes, TransformError> + Send + Sync,
{
    fn transform(&self, sample: Bytes, codec: VideoCodec) -> Result<Bytes, TransformError> {
        self(sample, codec)
    }
}

/// What the stage did with one video tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a key AVC frame, or the stage is disabled
    Bypassed,
    /// Key AVC frame carrying a sequence header or end-of-sequence marker
    NotSampleData,
    /// The transform produced the recorded payload
    Transformed,
    /// The transform failed; the original payload was kept
    FailedOpen(TransformError),
}

/// Codec packet to record plus how it was produced
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub data: Bytes,
    pub outcome: Outcome,
}

/// Routes key AVC samples through a [`FrameTransform`]
///
/// One stage serves one stream: it remembers the NALU length prefix width
/// from the last AVC sequence header and hands it to the transform.
#[derive(Clone)]
pub struct KeyframeStage {
    transform: Option<Arc<dyn FrameTransform>>,
    nalu_length_size: Option<u8>,
}

impl KeyframeStage {
    pub fn new(transform: Arc<dyn FrameTransform>) -> Self {
        Self {
            transform: Some(transform),
            nalu_length_size: None,
        }
    }

    /// A stage that passes every sample through untouched
    pub fn disabled() -> Self {
        Self {
            transform: None,
            nalu_length_size: None,
        }
    }

    /// Prefix width from the last parsed sequence header
    pub fn nalu_length_size(&self) -> Option<u8> {
        self.nalu_length_size
    }

    pub fn is_enabled(&self) -> bool {
        self.transform.is_some()
    }

    /// Whether a video tag is eligible for the transform
    pub fn applies_to(video: &VideoData) -> bool {
        video.is_keyframe() && video.codec == VideoCodec::Avc
    }

    /// Produce the codec packet to record for `video`
    ///
    /// Never fails. Bypassed and failed samples come back byte-identical.
    pub fn process(&mut self, video: &VideoData) -> StageOutput {
        let transform = match &self.transform {
            Some(t) if Self::applies_to(video) => Arc::clone(t),
            _ => return Self::original(video, Outcome::Bypassed),
        };

        match self.run(transform.as_ref(), video) {
            Ok(Some(data)) => StageOutput {
                data,
                outcome: Outcome::Transformed,
            },
            Ok(None) => Self::original(video, Outcome::NotSampleData),
            Err(e) => Self::original(video, Outcome::FailedOpen(e)),
        }
    }

    fn run(
        &mut self,
        transform: &dyn FrameTransform,
        video: &VideoData,
    ) -> Result<Option<Bytes>, TransformError> {
        let packet = AvcPacket::decode(video.data.clone())
            .map_err(|e| TransformError::Decode(e.to_string()))?;
        if !packet.is_nalu() {
            if let Some(Ok(config)) = packet.config() {
                self.nalu_length_size = Some(config.nalu_length_size);
            }
            return Ok(None);
        }

        let nalus = packet.data.clone();
        let length_size = self.nalu_length_size;
        let processed = panic::catch_unwind(AssertUnwindSafe(|| match length_size {
            Some(size) => transform.transform_framed(nalus, video.codec, size),
            None => transform.transform(nalus, video.codec),
        }))
        .map_err(|_| TransformError::Panicked)??;

        Ok(Some(packet.with_data(processed).to_bytes()))
    }

    fn original(video: &VideoData, outcome: Outcome) -> StageOutput {
        StageOutput {
            data: video.data.clone(),
            outcome,
        }
    }
}

impl std::fmt::Debug for KeyframeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyframeStage")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
