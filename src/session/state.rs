//! Session state machine
//!
//! Tracks one ingest session from connection to close.

use std::time::{Duration, Instant};

use crate::error::{Result, SessionError};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, no connect command yet
    Idle,
    /// Connect command accepted
    Connected,
    /// createStream acknowledged
    StreamCreated,
    /// Recording file open, media accepted
    Publishing,
    /// A fatal error occurred; only close is accepted
    Failed,
    /// Session closed, file released
    Closed,
}

impl SessionPhase {
    pub fn is_publishing(self) -> bool {
        self == SessionPhase::Publishing
    }

    pub fn is_closed(self) -> bool {
        self == SessionPhase::Closed
    }
}

/// Phase plus the timestamps that go with it
#[derive(Debug)]
pub struct SessionState {
    pub id: u64,
    pub phase: SessionPhase,
    pub created_at: Instant,
    pub publish_started_at: Option<Instant>,
}

impl SessionState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: SessionPhase::Idle,
            created_at: Instant::now(),
            publish_started_at: None,
        }
    }

    /// Error for any callback arriving after a terminal phase
    pub fn ensure_open(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Failed => Err(SessionError::Failed.into()),
            SessionPhase::Closed => Err(SessionError::Closed.into()),
            _ => Ok(()),
        }
    }

    /// Error unless media can be recorded right now
    pub fn ensure_publishing(&self) -> Result<()> {
        self.ensure_open()?;
        if self.phase.is_publishing() {
            Ok(())
        } else {
            Err(SessionError::NotPublishing.into())
        }
    }

    /// Returns false when the session was already past `Idle`
    pub fn connect(&mut self) -> bool {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Connected;
            true
        } else {
            false
        }
    }

    pub fn create_stream(&mut self) {
        if matches!(self.phase, SessionPhase::Idle | SessionPhase::Connected) {
            self.phase = SessionPhase::StreamCreated;
        }
    }

    pub fn start_publish(&mut self) {
        self.phase = SessionPhase::Publishing;
        self.publish_started_at = Some(Instant::now());
    }

    pub fn fail(&mut self) {
        if !self.phase.is_closed() {
            self.phase = SessionPhase::Failed;
        }
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time spent publishing, if publishing ever started
    pub fn publish_duration(&self) -> Option<Duration> {
        self.publish_started_at.map(|t| t.elapsed())
    }
}
