//! FLV tag model and tag codec
//!
//! Each RTMP audio/video/data message is an FLV tag body without the tag
//! header. This module decodes those bodies into typed records and encodes
//! them back; [`super::container`] adds the tag framing.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+----------+----------+----------+-----------------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | [AACPacketType] | AudioData...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (1 byte, AAC)   |
//! +-----------+----------+----------+----------+-----------------+
//! ```
//!
//! Decoding keeps every header field, so for any payload that decodes
//! successfully, encoding the result yields the same bytes.

use bytes::{BufMut, Bytes, BytesMut};

use super::aac::AacPacketType;
use crate::amf::amf0::{encode_into, Amf0Decoder};
use crate::amf::AmfValue;
use crate::error::{MediaError, Result};

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        // Upper bits carry the (unsupported) filter/encryption flag
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Sorenson H.263
    SorensonH263 = 2,
    /// Screen video
    ScreenVideo = 3,
    /// VP6
    Vp6 = 4,
    /// VP6 with alpha
    Vp6Alpha = 5,
    /// Screen video v2
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265) - enhanced RTMP extension
    Hevc = 12,
    /// AV1 - enhanced RTMP extension
    Av1 = 13,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Linear PCM, platform endian
    LinearPcmPlatform = 0,
    /// ADPCM
    Adpcm = 1,
    /// MP3
    Mp3 = 2,
    /// Linear PCM, little endian
    LinearPcmLe = 3,
    /// Nellymoser 16kHz mono
    Nellymoser16kMono = 4,
    /// Nellymoser 8kHz mono
    Nellymoser8kMono = 5,
    /// Nellymoser
    Nellymoser = 6,
    /// G.711 A-law
    G711ALaw = 7,
    /// G.711 mu-law
    G711MuLaw = 8,
    /// AAC
    Aac = 10,
    /// Speex
    Speex = 11,
    /// MP3 8kHz
    Mp38k = 14,
    /// Device-specific sound
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}

/// Audio sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleRate {
    Rate5512 = 0,
    Rate11025 = 1,
    Rate22050 = 2,
    Rate44100 = 3,
}

impl AudioSampleRate {
    pub fn from_byte(b: u8) -> Self {
        match (b >> 2) & 0x03 {
            0 => AudioSampleRate::Rate5512,
            1 => AudioSampleRate::Rate11025,
            2 => AudioSampleRate::Rate22050,
            _ => AudioSampleRate::Rate44100,
        }
    }

    pub fn to_hz(&self) -> u32 {
        match self {
            AudioSampleRate::Rate5512 => 5512,
            AudioSampleRate::Rate11025 => 11025,
            AudioSampleRate::Rate22050 => 22050,
            AudioSampleRate::Rate44100 => 44100,
        }
    }
}

/// Audio sample size (bit 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSize {
    Bits8 = 0,
    Bits16 = 1,
}

/// Audio channel layout (bit 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundType {
    Mono = 0,
    Stereo = 1,
}

/// Script data tag body: AMF0 values, the first being the handler name
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptData {
    pub values: Vec<AmfValue>,
}

impl ScriptData {
    /// Decode a script data body
    ///
    /// Strict AMF0 decoding is used so that any accepted body re-encodes to
    /// the same bytes.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(MediaError::EmptyPayload.into());
        }

        let values = Amf0Decoder::with_lenient(false).decode_all(&mut payload)?;
        match values.first() {
            Some(v) if v.as_str().is_some() => Ok(ScriptData { values }),
            _ => Err(MediaError::MissingScriptName.into()),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        for value in &self.values {
            encode_into(buf, value);
        }
    }

    /// Handler name, e.g. `onMetaData`
    pub fn name(&self) -> &str {
        self.values.first().and_then(|v| v.as_str()).unwrap_or_default()
    }

    /// First value after the name, normally the metadata ECMA array
    pub fn metadata(&self) -> Option<&AmfValue> {
        self.values.get(1)
    }
}

/// Audio tag body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioData {
    pub format: AudioFormat,
    pub sample_rate: AudioSampleRate,
    pub sound_size: SoundSize,
    pub sound_type: SoundType,
    /// Present only for AAC
    pub aac_packet_type: Option<AacPacketType>,
    pub data: Bytes,
}

impl AudioData {
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(MediaError::EmptyPayload.into());
        }

        let header = payload[0];
        let format = AudioFormat::from_byte(header)
            .ok_or(MediaError::UnknownAudioFormat((header >> 4) & 0x0F))?;
        let sample_rate = AudioSampleRate::from_byte(header);
        let sound_size = if header & 0x02 != 0 {
            SoundSize::Bits16
        } else {
            SoundSize::Bits8
        };
        let sound_type = if header & 0x01 != 0 {
            SoundType::Stereo
        } else {
            SoundType::Mono
        };

        let mut data = payload.split_off(1);
        let aac_packet_type = if format == AudioFormat::Aac {
            if data.is_empty() {
                return Err(MediaError::InvalidAacPacket.into());
            }
            let packet_type =
                AacPacketType::from_byte(data[0]).ok_or(MediaError::InvalidAacPacket)?;
            data = data.split_off(1);
            Some(packet_type)
        } else {
            None
        };

        Ok(AudioData {
            format,
            sample_rate,
            sound_size,
            sound_type,
            aac_packet_type,
            data,
        })
    }

    pub fn header_byte(&self) -> u8 {
        ((self.format as u8) << 4)
            | ((self.sample_rate as u8) << 2)
            | ((self.sound_size as u8) << 1)
            | (self.sound_type as u8)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.header_byte());
        if let Some(packet_type) = self.aac_packet_type {
            buf.put_u8(packet_type as u8);
        }
        buf.put_slice(&self.data);
    }

    pub fn is_aac_sequence_header(&self) -> bool {
        self.aac_packet_type == Some(AacPacketType::SequenceHeader)
    }
}

/// Video tag body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoData {
    pub frame_type: VideoFrameType,
    pub codec: VideoCodec,
    /// Codec-specific packet (for AVC: packet type, composition time, NALUs)
    pub data: Bytes,
}

impl VideoData {
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(MediaError::EmptyPayload.into());
        }

        let header = payload[0];
        let frame_type = VideoFrameType::from_byte(header)
            .ok_or(MediaError::UnknownFrameType((header >> 4) & 0x0F))?;
        let codec =
            VideoCodec::from_byte(header).ok_or(MediaError::UnknownVideoCodec(header & 0x0F))?;

        Ok(VideoData {
            frame_type,
            codec,
            data: payload.split_off(1),
        })
    }

    pub fn header_byte(&self) -> u8 {
        ((self.frame_type as u8) << 4) | (self.codec as u8)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.header_byte());
        buf.put_slice(&self.data);
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type.is_keyframe()
    }

    /// Same frame header with a replacement codec packet
    pub fn with_data(&self, data: Bytes) -> Self {
        VideoData {
            frame_type: self.frame_type,
            codec: self.codec,
            data,
        }
    }

    pub fn is_avc_sequence_header(&self) -> bool {
        self.codec == VideoCodec::Avc && self.data.first() == Some(&0)
    }
}

/// Typed tag body
#[derive(Debug, Clone, PartialEq)]
pub enum TagData {
    Script(ScriptData),
    Audio(AudioData),
    Video(VideoData),
}

impl TagData {
    /// Decode a tag body of the given type
    pub fn decode(tag_type: FlvTagType, payload: Bytes) -> Result<Self> {
        Ok(match tag_type {
            FlvTagType::Script => TagData::Script(ScriptData::decode(payload)?),
            FlvTagType::Audio => TagData::Audio(AudioData::decode(payload)?),
            FlvTagType::Video => TagData::Video(VideoData::decode(payload)?),
        })
    }

    pub fn tag_type(&self) -> FlvTagType {
        match self {
            TagData::Script(_) => FlvTagType::Script,
            TagData::Audio(_) => FlvTagType::Audio,
            TagData::Video(_) => FlvTagType::Video,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            TagData::Script(script) => script.encode(buf),
            TagData::Audio(audio) => audio.encode(buf),
            TagData::Video(video) => video.encode(buf),
        }
    }
}

/// Timestamped FLV tag
#[derive(Debug, Clone, PartialEq)]
pub struct FlvTag {
    /// Timestamp in milliseconds
    pub timestamp: u32,
    pub data: TagData,
}

impl FlvTag {
    pub fn script(timestamp: u32, script: ScriptData) -> Self {
        Self {
            timestamp,
            data: TagData::Script(script),
        }
    }

    pub fn audio(timestamp: u32, audio: AudioData) -> Self {
        Self {
            timestamp,
            data: TagData::Audio(audio),
        }
    }

    pub fn video(timestamp: u32, video: VideoData) -> Self {
        Self {
            timestamp,
            data: TagData::Video(video),
        }
    }

    pub fn tag_type(&self) -> FlvTagType {
        self.data.tag_type()
    }

    /// Encoded tag body
    pub fn body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.data.encode(&mut buf);
        buf.freeze()
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(&self.data, TagData::Video(v) if v.is_keyframe())
    }
}
