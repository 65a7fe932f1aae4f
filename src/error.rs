//! Error types
//!
//! Each concern has its own error enum; [`Error`] aggregates them so that
//! codecs and the session controller can share one `Result` alias.

use std::time::Duration;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
}

/// AMF0 decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmfError {
    #[error("unexpected end of AMF data")]
    UnexpectedEof,

    #[error("unknown AMF0 marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("unsupported AMF0 marker 0x{0:02x}")]
    UnsupportedMarker(u8),

    #[error("invalid boolean byte 0x{0:02x}")]
    InvalidBoolean(u8),

    #[error("invalid object end marker")]
    InvalidObjectEnd,

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("invalid reference index {0}")]
    InvalidReference(u16),

    #[error("nesting too deep")]
    NestingTooDeep,
}

/// FLV tag and codec payload errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("empty tag payload")]
    EmptyPayload,

    #[error("unknown video frame type {0}")]
    UnknownFrameType(u8),

    #[error("unknown video codec {0}")]
    UnknownVideoCodec(u8),

    #[error("unknown audio format {0}")]
    UnknownAudioFormat(u8),

    #[error("invalid AAC packet")]
    InvalidAacPacket,

    #[error("invalid AVC packet")]
    InvalidAvcPacket,

    #[error("script data must start with a handler name")]
    MissingScriptName,

    #[error("invalid FLV header")]
    InvalidFlvHeader,

    #[error("unknown FLV tag type {0}")]
    UnknownTagType(u8),

    #[error("tag body of {0} bytes exceeds 24-bit size field")]
    TagTooLarge(usize),

    #[error("writer stopped after an earlier write failure")]
    WriterFailed,

    #[error("previous tag size mismatch: expected {expected}, found {found}")]
    PreviousTagSizeMismatch { expected: u32, found: u32 },
}

/// Session state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("stream is not publishing")]
    NotPublishing,

    #[error("stream is already publishing")]
    AlreadyPublishing,

    #[error("publish rejected: empty stream name")]
    EmptyStreamName,

    #[error("session has failed and accepts no further work")]
    Failed,

    #[error("session is closed")]
    Closed,

    #[error("session limit reached")]
    LimitReached,
}

/// Keyframe transform failures
///
/// These never escape the transform stage: it logs them and keeps the
/// original sample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("failed to decode sample: {0}")]
    Decode(String),

    #[error("visual transform failed: {0}")]
    Apply(String),

    #[error("failed to encode sample: {0}")]
    Encode(String),

    #[error("transform exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("transform panicked")]
    Panicked,
}
