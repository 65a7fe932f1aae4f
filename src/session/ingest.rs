//! Ingest session
//!
//! One [`Session`] per RTMP connection. It owns the recording file from
//! publish until close and turns each media callback into exactly one FLV
//! tag, in callback order.
//!
//! Failure handling differs per tag type:
//! - script data that does not decode is logged and skipped
//! - audio/video that does not decode fails the session
//! - a tag that cannot be written is logged and the session continues, but
//!   the file stops growing and is cut back to its last complete tag on close
//! - the keyframe transform fails open (see [`crate::transform`])

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OwnedSemaphorePermit;

use super::context::{ConnectInfo, SessionContext};
use super::recording::Recording;
use super::state::{SessionPhase, SessionState};
use super::stream::RecordingStats;
use crate::error::{Error, Result, SessionError};
use crate::media::aac::AudioSpecificConfig;
use crate::media::flv::{AudioData, FlvTag, FlvTagType, ScriptData, VideoData};
use crate::media::h264::AvcPacket;
use crate::server::config::RecorderConfig;
use crate::server::handler::IngestHandler;
use crate::storage::PathResolver;
use crate::transform::{KeyframeStage, Outcome};

/// Records one publisher's stream to an FLV file
pub struct Session {
    state: SessionState,
    context: SessionContext,
    config: Arc<RecorderConfig>,
    resolver: PathResolver,
    stage: KeyframeStage,
    recording: Option<Recording>,
    stats: RecordingStats,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Session {
    pub fn new(id: u64, config: Arc<RecorderConfig>, stage: KeyframeStage) -> Self {
        let resolver = config.resolver();
        Self {
            state: SessionState::new(id),
            context: SessionContext::new(id),
            config,
            resolver,
            stage,
            recording: None,
            stats: RecordingStats::new(),
            _permit: None,
        }
    }

    /// Hold a session-limit permit for the lifetime of the session
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    /// Path of the open recording, if publishing
    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.path())
    }

    /// Flush and close the recording; idempotent
    pub fn close(&mut self) -> Result<()> {
        if self.state.phase.is_closed() {
            return Ok(());
        }

        let result = match self.recording.take() {
            Some(recording) => {
                let path = recording.path().to_path_buf();
                let result = recording.finish();
                tracing::info!(
                    session_id = self.id(),
                    stream = self.context.stream(),
                    path = %path.display(),
                    tags = self.stats.tags_written(),
                    keyframes = self.stats.keyframes,
                    transformed = self.stats.transformed,
                    transform_failures = self.stats.transform_failures,
                    dropped_scripts = self.stats.dropped_scripts,
                    write_errors = self.stats.write_errors,
                    bytes = self.stats.bytes_written,
                    duration_ms = self.state.publish_duration().unwrap_or_default().as_millis() as u64,
                    "Recording closed"
                );
                result
            }
            None => {
                tracing::debug!(
                    session_id = self.id(),
                    session_ms = self.state.duration().as_millis() as u64,
                    "Session closed without recording"
                );
                Ok(())
            }
        };

        self.state.close();
        if let Err(ref e) = result {
            tracing::error!(session_id = self.id(), error = %e, "Failed to flush recording");
        }
        result
    }

    fn open_recording(&self, stream_name: &str) -> Result<Recording> {
        let path = self.resolver.resolve(stream_name)?;
        Recording::create(path, self.config.flags, self.config.write_buffer_size)
    }

    /// Mark the session failed and hand back the error
    fn fail(&mut self, kind: &'static str, err: Error) -> Result<()> {
        tracing::error!(
            session_id = self.id(),
            stream = self.context.stream(),
            kind,
            error = %err,
            "Fatal session error"
        );
        self.state.fail();
        Err(err)
    }

    fn observe_timestamp(&mut self, tag_type: FlvTagType, timestamp: u32) {
        if !self.config.validate_timestamps {
            return;
        }
        if let Some(previous) = self.stats.observe_timestamp(tag_type, timestamp) {
            tracing::warn!(
                session_id = self.id(),
                tag_type = ?tag_type,
                previous,
                timestamp,
                "Timestamp went backwards"
            );
        }
    }

    /// Append a tag; write failures are counted, not propagated
    fn write(&mut self, tag: FlvTag) {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };

        if let Err(e) = recording.write(&tag) {
            self.stats.write_errors += 1;
            tracing::warn!(
                session_id = self.state.id,
                tag_type = ?tag.tag_type(),
                timestamp = tag.timestamp,
                error = %e,
                "Failed to write tag"
            );
        }
        self.stats.bytes_written = recording.bytes_written();
    }

    fn log_video_header(&self, video: &VideoData) {
        let config = AvcPacket::decode(video.data.clone())
            .ok()
            .and_then(|packet| packet.config())
            .and_then(|config| config.ok());

        match config {
            Some(config) => tracing::debug!(
                session_id = self.id(),
                profile = config.profile_name(),
                level = %config.level_string(),
                nalu_length_size = config.nalu_length_size,
                sps = config.sps.len(),
                pps = config.pps.len(),
                "Video sequence header"
            ),
            None => tracing::debug!(
                session_id = self.id(),
                "Video sequence header could not be parsed"
            ),
        }
    }

    fn log_audio_header(&self, audio: &AudioData) {
        if let Ok(config) = AudioSpecificConfig::parse(audio.data.clone()) {
            tracing::debug!(
                session_id = self.id(),
                profile = config.profile_name(),
                sampling_frequency = config.sampling_frequency,
                channels = config.channels(),
                "Audio sequence header"
            );
        }
    }
}

impl IngestHandler for Session {
    fn on_connect(&mut self, info: &ConnectInfo) -> Result<()> {
        self.state.ensure_open()?;
        if !self.state.connect() {
            tracing::debug!(session_id = self.id(), "Repeated connect ignored");
            return Ok(());
        }

        self.context.with_connect(info);
        tracing::debug!(
            session_id = self.id(),
            app = %info.app,
            tc_url = ?info.tc_url,
            peer = ?info.peer_addr,
            "Connect"
        );
        Ok(())
    }

    fn on_create_stream(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.state.create_stream();
        Ok(())
    }

    fn on_publish(&mut self, stream_name: &str) -> Result<()> {
        self.state.ensure_open()?;
        if self.state.phase.is_publishing() {
            return Err(SessionError::AlreadyPublishing.into());
        }
        if stream_name.is_empty() && self.config.require_stream_name {
            tracing::warn!(session_id = self.id(), "Publish rejected: empty stream name");
            return Err(SessionError::EmptyStreamName.into());
        }

        let recording = match self.open_recording(stream_name) {
            Ok(recording) => recording,
            Err(e) => return self.fail("publish", e),
        };

        tracing::info!(
            session_id = self.id(),
            stream = stream_name,
            path = %recording.path().display(),
            "Recording started"
        );

        self.stats.bytes_written = recording.bytes_written();
        self.context.stream_name = Some(stream_name.to_string());
        self.recording = Some(recording);
        self.state.start_publish();
        Ok(())
    }

    fn on_metadata(&mut self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.state.ensure_publishing()?;

        let script = match ScriptData::decode(payload) {
            Ok(script) => script,
            Err(e) => {
                self.stats.dropped_scripts += 1;
                tracing::warn!(
                    session_id = self.id(),
                    timestamp,
                    error = %e,
                    "Dropping undecodable script data"
                );
                return Ok(());
            }
        };

        tracing::debug!(session_id = self.id(), name = script.name(), "Script data");
        self.stats.on_script();
        self.observe_timestamp(FlvTagType::Script, timestamp);
        self.write(FlvTag::script(timestamp, script));
        Ok(())
    }

    fn on_audio(&mut self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.state.ensure_publishing()?;

        let audio = match AudioData::decode(payload) {
            Ok(audio) => audio,
            Err(e) => return self.fail("audio", e),
        };

        let is_header = audio.is_aac_sequence_header();
        if is_header {
            self.log_audio_header(&audio);
        }
        self.stats.on_audio(is_header);
        self.observe_timestamp(FlvTagType::Audio, timestamp);
        self.write(FlvTag::audio(timestamp, audio));
        Ok(())
    }

    fn on_video(&mut self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.state.ensure_publishing()?;

        let video = match VideoData::decode(payload) {
            Ok(video) => video,
            Err(e) => return self.fail("video", e),
        };

        let is_header = video.is_avc_sequence_header();
        if is_header {
            self.log_video_header(&video);
        }

        let output = self.stage.process(&video);
        if let Outcome::FailedOpen(ref e) = output.outcome {
            tracing::warn!(
                session_id = self.id(),
                stream = self.context.stream(),
                timestamp,
                error = %e,
                "Keyframe transform failed, recording original frame"
            );
        }
        self.stats.on_video(video.is_keyframe(), is_header, &output.outcome);

        let video = match output.outcome {
            Outcome::Transformed => video.with_data(output.data),
            _ => video,
        };
        self.observe_timestamp(FlvTagType::Video, timestamp);
        self.write(FlvTag::video(timestamp, video));
        Ok(())
    }

    fn on_close(&mut self) -> Result<()> {
        self.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.state.phase.is_closed() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.state.id)
            .field("phase", &self.state.phase)
            .field("stream", &self.context.stream_name)
            .field("recording", &self.recording_path())
            .finish()
    }
}
