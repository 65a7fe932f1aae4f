//! AAC audio parsing
//!
//! RTMP carries raw AAC frames (no ADTS headers). Audio tags only need the
//! packet type for framing; the AudioSpecificConfig from the sequence header
//! is parsed so a recording can log what the publisher sends.

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AAC packet type (second byte of an AAC audio tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// Sampling frequencies by index (ISO 14496-3, 1.6.3.4)
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Leading fields of an AudioSpecificConfig
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC, 5 = HE-AAC)
    pub audio_object_type: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1 = mono, 2 = stereo, 7 = 7.1)
    pub channel_configuration: u8,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Parse from the body of an AAC sequence header (after the packet type)
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        // 5 bits object type, 4 bits frequency index, 4 bits channels
        let audio_object_type = data[0] >> 3;
        let frequency_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);

        let (sampling_frequency, channel_byte) = if frequency_index == 0x0F {
            // Explicit 24-bit frequency follows the index
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket.into());
            }
            let freq = ((data[1] as u32 & 0x7F) << 17)
                | ((data[2] as u32) << 9)
                | ((data[3] as u32) << 1)
                | (data[4] as u32 >> 7);
            (freq, (data[4] >> 3) & 0x0F)
        } else {
            let freq = *SAMPLING_FREQUENCIES
                .get(frequency_index as usize)
                .ok_or(MediaError::InvalidAacPacket)?;
            (freq, (data[1] >> 3) & 0x0F)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency,
            channel_configuration: channel_byte,
            raw: data,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.audio_object_type {
            1 => "AAC Main",
            2 => "AAC LC",
            3 => "AAC SSR",
            4 => "AAC LTP",
            5 => "HE-AAC",
            29 => "HE-AACv2",
            _ => "Unknown",
        }
    }

    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8,
            c @ 1..=6 => c,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aac_packet_type() {
        assert_eq!(
            AacPacketType::from_byte(0),
            Some(AacPacketType::SequenceHeader)
        );
        assert_eq!(AacPacketType::from_byte(1), Some(AacPacketType::Raw));
        assert_eq!(AacPacketType::from_byte(2), None);
    }

    #[test]
    fn test_lc_44100_stereo() {
        let config = AudioSpecificConfig::parse(Bytes::from_static(&[0x12, 0x10])).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
        assert_eq!(config.profile_name(), "AAC LC");
    }

    #[test]
    fn test_48000_mono() {
        // object type 2, index 3, channels 1
        let config = AudioSpecificConfig::parse(Bytes::from_static(&[0x11, 0x88])).unwrap();
        assert_eq!(config.sampling_frequency, 48000);
        assert_eq!(config.channels(), 1);
    }

    #[test]
    fn test_explicit_frequency() {
        // object type 2, index 15, frequency 44100, channels 2
        let freq: u32 = 44100;
        let bits: u64 = (2u64 << 35) | (0xFu64 << 31) | ((freq as u64) << 7) | (2u64 << 3);
        let bytes = bits.to_be_bytes();
        let data = Bytes::copy_from_slice(&bytes[3..8]);

        let config = AudioSpecificConfig::parse(data).unwrap();
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x12])).is_err());
        // Frequency index 13 is reserved
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x16, 0x90])).is_err());
        // Explicit frequency but truncated
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x17, 0x80, 0x00])).is_err());
    }
}
