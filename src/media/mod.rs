//! Media handling for recording
//!
//! This module provides:
//! - FLV tag body decoding and re-encoding (the tag codec)
//! - FLV container writing and reading
//! - H.264/AVC packet and NALU parsing
//! - AAC packet parsing

pub mod aac;
pub mod container;
pub mod flv;
pub mod h264;

pub use aac::{AacPacketType, AudioSpecificConfig};
pub use container::{FlvFlags, FlvReader, FlvWriter, RawTag};
pub use flv::{
    AudioData, AudioFormat, FlvTag, FlvTagType, ScriptData, TagData, VideoCodec, VideoData,
    VideoFrameType,
};
pub use h264::{AvcConfig, AvcPacket, AvcPacketType, NaluIterator, NaluType};
