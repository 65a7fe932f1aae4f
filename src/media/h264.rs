//! H.264/AVC packet parsing
//!
//! The codec packet of an AVC video tag (everything after the frame/codec
//! byte):
//! ```text
//! +-----------------+------------------+---------------------------+
//! | AVCPacketType   | CompositionTime  | Data                      |
//! | (1 byte)        | (3 bytes, SI24)  | config record or NALUs    |
//! +-----------------+------------------+---------------------------+
//! ```
//!
//! NAL units are in AVCC form: each is preceded by a big-endian length of
//! `lengthSizeMinusOne + 1` bytes, as announced by the sequence header.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord
    SequenceHeader = 0,
    Nalu = 1,
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// NAL unit type, from the low 5 bits of the NAL header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice,
    /// IDR slice
    Idr,
    Sei,
    Sps,
    Pps,
    /// Access unit delimiter
    Aud,
    Other(u8),
}

impl NaluType {
    pub fn from_header(b: u8) -> Self {
        match b & 0x1F {
            1 => NaluType::Slice,
            5 => NaluType::Idr,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            other => NaluType::Other(other),
        }
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// AVC video packet
///
/// Re-encoding preserves the packet type and composition time; only the
/// payload may be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcPacket {
    pub packet_type: AvcPacketType,
    /// Composition time offset in milliseconds (B-frames)
    pub composition_time: i32,
    pub data: Bytes,
}

impl AvcPacket {
    pub fn decode(mut data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let packet_type =
            AvcPacketType::from_byte(data.get_u8()).ok_or(MediaError::InvalidAvcPacket)?;
        // SI24: shift into the top of an i32 and back to sign-extend
        let composition_time = (data.get_uint(3) as i32) << 8 >> 8;

        Ok(AvcPacket {
            packet_type,
            composition_time,
            data,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(4 + self.data.len());
        buf.put_u8(self.packet_type as u8);
        buf.put_uint((self.composition_time & 0xFF_FFFF) as u64, 3);
        buf.put_slice(&self.data);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Same packet type and composition time with replacement payload
    pub fn with_data(&self, data: Bytes) -> Self {
        AvcPacket {
            packet_type: self.packet_type,
            composition_time: self.composition_time,
            data,
        }
    }

    pub fn is_sequence_header(&self) -> bool {
        self.packet_type == AvcPacketType::SequenceHeader
    }

    pub fn is_nalu(&self) -> bool {
        self.packet_type == AvcPacketType::Nalu
    }

    /// Parse the decoder configuration carried by a sequence header
    pub fn config(&self) -> Option<Result<AvcConfig>> {
        self.is_sequence_header()
            .then(|| AvcConfig::parse(self.data.clone()))
    }
}

/// AVCDecoderConfigurationRecord (ISO 14496-15, 5.2.4.1)
///
/// ```text
/// version(1) profile(1) compat(1) level(1) 111111|lengthSizeMinusOne(2)
/// 111|numSPS(5) { len(2) SPS }* numPPS(1) { len(2) PPS }*
/// ```
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// 66 = Baseline, 77 = Main, 100 = High, ...
    pub profile: u8,
    pub compatibility: u8,
    /// Level times ten (31 = 3.1)
    pub level: u8,
    /// NALU length prefix width in bytes
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub raw: Bytes,
}

impl AvcConfig {
    pub fn parse(raw: Bytes) -> Result<Self> {
        let mut data = raw.clone();
        if data.len() < 7 || data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let sps_count = data.get_u8() & 0x1F;
        let sps = read_parameter_sets(&mut data, sps_count)?;
        if !data.has_remaining() {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let pps_count = data.get_u8();
        let pps = read_parameter_sets(&mut data, pps_count)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
            raw,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    /// Level as "major.minor"
    pub fn level_string(&self) -> String {
        format!("{}.{}", self.level / 10, self.level % 10)
    }
}

fn read_parameter_sets(data: &mut Bytes, count: u8) -> Result<Vec<Bytes>> {
    (0..count)
        .map(|_| -> Result<Bytes> {
            if data.remaining() < 2 {
                return Err(MediaError::InvalidAvcPacket.into());
            }
            let len = data.get_u16() as usize;
            if data.remaining() < len {
                return Err(MediaError::InvalidAvcPacket.into());
            }
            Ok(data.split_to(len))
        })
        .collect()
}

/// Iterator over length-prefixed NAL units
///
/// Stops at the first unit whose prefix or body runs past the end of the
/// buffer.
pub struct NaluIterator<'a> {
    remaining: &'a [u8],
    length_size: usize,
}

impl<'a> NaluIterator<'a> {
    pub fn new(data: &'a [u8], nalu_length_size: u8) -> Self {
        Self {
            remaining: data,
            length_size: nalu_length_size as usize,
        }
    }
}

impl<'a> Iterator for NaluIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.length_size == 0 || self.remaining.len() < self.length_size {
            return None;
        }

        let (prefix, rest) = self.remaining.split_at(self.length_size);
        let len = prefix
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        if rest.len() < len {
            return None;
        }

        let (nalu, rest) = rest.split_at(len);
        self.remaining = rest;
        Some(nalu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_RECORD: &[u8] = &[
        0x01, 0x64, 0x00, 0x1F, 0xFF, // version, High, compat, level 3.1, 4-byte lengths
        0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // 1 SPS
        0x01, 0x00, 0x03, 0x68, 0xEF, 0x38, // 1 PPS
    ];

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_header(0x65), NaluType::Idr);
        assert_eq!(NaluType::from_header(0x41), NaluType::Slice);
        assert_eq!(NaluType::from_header(0x0C), NaluType::Other(12));
        assert!(NaluType::from_header(0x67).is_parameter_set());
        assert!(!NaluType::Idr.is_parameter_set());
    }

    #[test]
    fn test_avc_config_parse() {
        let data = Bytes::from_static(CONFIG_RECORD);
        let config = AvcConfig::parse(data.clone()).unwrap();

        assert_eq!(config.profile_name(), "High");
        assert_eq!(config.level_string(), "3.1");
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps, [Bytes::from_static(&[0x67, 0x64, 0x00, 0x1F])]);
        assert_eq!(config.pps, [Bytes::from_static(&[0x68, 0xEF, 0x38])]);
        assert_eq!(config.raw, data);
    }

    #[test]
    fn test_avc_config_rejects_bad_records() {
        let mut wrong_version = CONFIG_RECORD.to_vec();
        wrong_version[0] = 2;
        assert!(AvcConfig::parse(Bytes::from(wrong_version)).is_err());

        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x64, 0x00])).is_err());

        // SPS length runs past the end
        let truncated = &CONFIG_RECORD[..10];
        assert!(AvcConfig::parse(Bytes::copy_from_slice(truncated)).is_err());

        // PPS count missing
        let no_pps = &CONFIG_RECORD[..12];
        assert!(AvcConfig::parse(Bytes::copy_from_slice(no_pps)).is_err());
    }

    #[test]
    fn test_avc_packet_sequence_header() {
        let mut data = BytesMut::from(&[0x00, 0x00, 0x00, 0x00][..]);
        data.extend_from_slice(CONFIG_RECORD);
        let data = data.freeze();

        let packet = AvcPacket::decode(data.clone()).unwrap();
        assert!(packet.is_sequence_header());
        assert_eq!(packet.config().unwrap().unwrap().profile, 100);
        assert_eq!(packet.to_bytes(), data);
    }

    #[test]
    fn test_avc_packet_end_of_sequence() {
        let packet = AvcPacket::decode(Bytes::from_static(&[0x02, 0x00, 0x00, 0x00])).unwrap();
        assert_eq!(packet.packet_type, AvcPacketType::EndOfSequence);
        assert!(packet.data.is_empty());
        assert!(packet.config().is_none());
    }

    #[test]
    fn test_composition_time_sign() {
        let positive = Bytes::from_static(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x41]);
        let packet = AvcPacket::decode(positive.clone()).unwrap();
        assert_eq!(packet.composition_time, 256);
        assert_eq!(packet.to_bytes(), positive);

        let negative = Bytes::from_static(&[0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0x41]);
        let packet = AvcPacket::decode(negative.clone()).unwrap();
        assert_eq!(packet.composition_time, -256);
        assert_eq!(packet.to_bytes(), negative);
    }

    #[test]
    fn test_with_data_keeps_header() {
        let packet = AvcPacket::decode(Bytes::from_static(&[0x01, 0x00, 0x00, 0x21, 0xAA])).unwrap();
        let replaced = packet.with_data(Bytes::from_static(&[0xBB, 0xCC]));
        assert_eq!(
            replaced.to_bytes().as_ref(),
            &[0x01, 0x00, 0x00, 0x21, 0xBB, 0xCC]
        );
    }

    #[test]
    fn test_avc_packet_invalid() {
        assert!(AvcPacket::decode(Bytes::from_static(&[0x03, 0x00, 0x00, 0x00])).is_err());
        assert!(AvcPacket::decode(Bytes::from_static(&[0x00, 0x00])).is_err());
    }

    #[test]
    fn test_nalu_iterator() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x03, 0x67, 0x64, 0x00, // SPS
            0x00, 0x00, 0x00, 0x02, 0x68, 0xEF, // PPS
            0x00, 0x00, 0x00, 0x0A, 0x65, // truncated IDR
        ];

        let types: Vec<_> = NaluIterator::new(data, 4)
            .map(|nalu| NaluType::from_header(nalu[0]))
            .collect();
        assert_eq!(types, [NaluType::Sps, NaluType::Pps]);

        let short: &[u8] = &[0x00, 0x02, 0x65, 0x88];
        assert_eq!(NaluIterator::new(short, 2).count(), 1);
        assert_eq!(NaluIterator::new(&[], 4).count(), 0);
    }
}
