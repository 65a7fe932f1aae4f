//! FLV container writer and reader
//!
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//! ```
//!
//! Tag header:
//! ```text
//! +---------+-------------+---------------+-------------+-------------+
//! | Type(1) | DataSize(3) | Timestamp(3)  | TsExt(1)    | StreamID(3) |
//! +---------+-------------+---------------+-------------+-------------+
//! ```
//!
//! The writer appends tags in the order it is given them. A live file has no
//! index, so readers rely on that append order.
//!
//! A failed sink write may leave part of a tag behind. The writer then
//! refuses further tags, and [`valid_prefix_len`] finds where the last
//! complete tag ends so the file can be cut back to it.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::flv::{FlvTag, FlvTagType};
use crate::error::{MediaError, Result};

/// FLV file signature: "FLV" in ASCII
const FLV_SIGNATURE: [u8; 3] = [0x46, 0x4C, 0x56];

/// FLV version (always 1)
const FLV_VERSION: u8 = 0x01;

/// FLV header is always 9 bytes
const FLV_HEADER_SIZE: u32 = 9;

/// Tag header size
const TAG_HEADER_SIZE: usize = 11;

/// Largest body the 24-bit size field can describe
const MAX_TAG_BODY: usize = 0xFF_FFFF;

/// Capability flags advertised in the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvFlags {
    pub audio: bool,
    pub video: bool,
}

impl FlvFlags {
    pub const AUDIO_VIDEO: FlvFlags = FlvFlags {
        audio: true,
        video: true,
    };

    /// Type flags byte: bit 2 = audio, bit 0 = video
    pub fn as_byte(self) -> u8 {
        (u8::from(self.audio) << 2) | u8::from(self.video)
    }

    pub fn from_byte(b: u8) -> Self {
        FlvFlags {
            audio: b & 0x04 != 0,
            video: b & 0x01 != 0,
        }
    }
}

impl Default for FlvFlags {
    fn default() -> Self {
        Self::AUDIO_VIDEO
    }
}

/// Writes an FLV header followed by tags
#[derive(Debug)]
pub struct FlvWriter<W: Write> {
    sink: W,
    scratch: BytesMut,
    tags_written: u64,
    bytes_written: u64,
    previous_tag_size: u32,
    failed: bool,
}

impl<W: Write> FlvWriter<W> {
    /// Write the file header (9 bytes) plus PreviousTagSize0 (4 bytes)
    pub fn new(mut sink: W, flags: FlvFlags) -> Result<Self> {
        let mut header = [0u8; 13];
        header[..3].copy_from_slice(&FLV_SIGNATURE);
        header[3] = FLV_VERSION;
        header[4] = flags.as_byte();
        header[5..9].copy_from_slice(&FLV_HEADER_SIZE.to_be_bytes());
        // PreviousTagSize0 stays zero
        sink.write_all(&header)?;

        Ok(Self {
            sink,
            scratch: BytesMut::with_capacity(4096),
            tags_written: 0,
            bytes_written: header.len() as u64,
            previous_tag_size: 0,
            failed: false,
        })
    }

    /// Append one tag followed by its PreviousTagSize trailer
    ///
    /// An oversized body is rejected before anything reaches the sink. Once a
    /// sink write has failed, every later call fails with
    /// [`MediaError::WriterFailed`].
    pub fn encode(&mut self, tag: &FlvTag) -> Result<()> {
        if self.failed {
            return Err(MediaError::WriterFailed.into());
        }
        self.scratch.clear();
        self.scratch.put_bytes(0, TAG_HEADER_SIZE);
        tag.data.encode(&mut self.scratch);

        let data_size = self.scratch.len() - TAG_HEADER_SIZE;
        if data_size > MAX_TAG_BODY {
            return Err(MediaError::TagTooLarge(data_size).into());
        }

        let ts = tag.timestamp;
        let size = data_size as u32;
        let header = &mut self.scratch[..TAG_HEADER_SIZE];
        header[0] = tag.tag_type().as_byte();
        header[1..4].copy_from_slice(&size.to_be_bytes()[1..]);
        // Lower 24 bits, then the extension byte holding bits 24-31
        header[4..7].copy_from_slice(&ts.to_be_bytes()[1..]);
        header[7] = (ts >> 24) as u8;
        // Stream ID (always 0 in FLV files) is already zeroed

        let tag_size = (TAG_HEADER_SIZE + data_size) as u32;
        self.scratch.put_u32(tag_size);

        if let Err(e) = self.sink.write_all(&self.scratch) {
            self.failed = true;
            return Err(e.into());
        }

        self.tags_written += 1;
        self.bytes_written += self.scratch.len() as u64;
        self.previous_tag_size = tag_size;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    /// Whether a sink write has failed
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn tags_written(&self) -> u64 {
        self.tags_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Size of the last tag written, as recorded in its trailer
    pub fn previous_tag_size(&self) -> u32 {
        self.previous_tag_size
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Tag as stored in the file, body undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub tag_type: FlvTagType,
    pub timestamp: u32,
    pub body: Bytes,
}

/// Reads an FLV header and iterates the tags that follow
#[derive(Debug)]
pub struct FlvReader<R: Read> {
    source: R,
    flags: FlvFlags,
    previous_tag_size: u32,
    position: u64,
}

impl<R: Read> FlvReader<R> {
    /// Read and validate the header and PreviousTagSize0
    pub fn new(mut source: R) -> Result<Self> {
        let mut header = [0u8; 9];
        source.read_exact(&mut header)?;
        if header[..3] != FLV_SIGNATURE || header[3] != FLV_VERSION {
            return Err(MediaError::InvalidFlvHeader.into());
        }

        let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
        if data_offset < FLV_HEADER_SIZE {
            return Err(MediaError::InvalidFlvHeader.into());
        }
        // Skip any header extension
        io::copy(
            &mut (&mut source).take(u64::from(data_offset - FLV_HEADER_SIZE)),
            &mut io::sink(),
        )?;

        let mut reader = Self {
            source,
            flags: FlvFlags::from_byte(header[4]),
            previous_tag_size: 0,
            position: u64::from(data_offset),
        };
        reader.check_trailer()?;
        Ok(reader)
    }

    pub fn flags(&self) -> FlvFlags {
        self.flags
    }

    /// Bytes consumed so far; always at a tag boundary
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next tag, or `None` at a clean end of file
    pub fn read_tag(&mut self) -> Result<Option<RawTag>> {
        let mut header = [0u8; TAG_HEADER_SIZE];
        match read_full(&mut self.source, &mut header)? {
            0 => return Ok(None),
            n if n < TAG_HEADER_SIZE => {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
            }
            _ => {}
        }

        let tag_type =
            FlvTagType::from_byte(header[0]).ok_or(MediaError::UnknownTagType(header[0]))?;
        let size = u32::from_be_bytes([0, header[1], header[2], header[3]]);
        let timestamp = u32::from_be_bytes([header[7], header[4], header[5], header[6]]);

        let mut body = vec![0u8; size as usize];
        self.source.read_exact(&mut body)?;

        self.previous_tag_size = TAG_HEADER_SIZE as u32 + size;
        self.check_trailer()?;
        self.position += u64::from(self.previous_tag_size);

        Ok(Some(RawTag {
            tag_type,
            timestamp,
            body: Bytes::from(body),
        }))
    }

    fn check_trailer(&mut self) -> Result<()> {
        let mut trailer = [0u8; 4];
        self.source.read_exact(&mut trailer)?;
        let found = u32::from_be_bytes(trailer);
        if found != self.previous_tag_size {
            return Err(MediaError::PreviousTagSizeMismatch {
                expected: self.previous_tag_size,
                found,
            }
            .into());
        }
        self.position += trailer.len() as u64;
        Ok(())
    }
}

impl<R: Read> Iterator for FlvReader<R> {
    type Item = Result<RawTag>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_tag().transpose()
    }
}

/// Length of the longest prefix of `source` that is a valid FLV file
///
/// Zero when even the header is incomplete.
pub fn valid_prefix_len<R: Read>(source: R) -> u64 {
    let Ok(mut reader) = FlvReader::new(source) else {
        return 0;
    };
    let mut len = reader.position();
    while let Ok(Some(_)) = reader.read_tag() {
        len = reader.position();
    }
    len
}

/// Like `read_exact`, but reports how many bytes were read before EOF
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::flv::{AudioData, TagData, VideoData};
    use std::io::Cursor;

    fn video_tag(timestamp: u32, body: &'static [u8]) -> FlvTag {
        FlvTag::video(timestamp, VideoData::decode(Bytes::from_static(body)).unwrap())
    }

    #[test]
    fn test_header_reflects_flags() {
        let writer = FlvWriter::new(Vec::new(), FlvFlags::AUDIO_VIDEO).unwrap();
        assert_eq!(
            writer.get_ref().as_slice(),
            &[0x46, 0x4C, 0x56, 0x01, 0x05, 0, 0, 0, 9, 0, 0, 0, 0]
        );

        let audio_only = FlvFlags {
            audio: true,
            video: false,
        };
        let writer = FlvWriter::new(Vec::new(), audio_only).unwrap();
        assert_eq!(writer.get_ref()[4], 0x04);
        assert_eq!(writer.bytes_written(), 13);
    }

    #[test]
    fn test_tag_framing() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        writer.encode(&video_tag(0x0102_0304, &[0x17, 0x01])).unwrap();

        let out = writer.into_inner();
        let tag = &out[13..];
        assert_eq!(tag[0], 9); // video
        assert_eq!(&tag[1..4], &[0, 0, 2]); // data size
        assert_eq!(&tag[4..8], &[0x02, 0x03, 0x04, 0x01]); // ts + ext
        assert_eq!(&tag[8..11], &[0, 0, 0]); // stream id
        assert_eq!(&tag[11..13], &[0x17, 0x01]);
        assert_eq!(&tag[13..17], &13u32.to_be_bytes());
        assert_eq!(tag.len(), 17);
    }

    #[test]
    fn test_writer_state() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        writer.encode(&video_tag(0, &[0x27, 0x01, 0x00])).unwrap();
        writer
            .encode(&FlvTag::audio(
                0,
                AudioData::decode(Bytes::from_static(&[0xAF, 0x01])).unwrap(),
            ))
            .unwrap();

        assert_eq!(writer.tags_written(), 2);
        assert_eq!(writer.previous_tag_size(), 11 + 2);
        assert_eq!(writer.bytes_written(), 13 + (11 + 3 + 4) + (11 + 2 + 4));
        assert_eq!(writer.bytes_written(), writer.get_ref().len() as u64);
    }

    #[test]
    fn test_oversized_tag_rejected_without_writing() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        let huge = VideoData::decode(Bytes::from(vec![0x27; MAX_TAG_BODY + 1])).unwrap();

        let err = writer.encode(&FlvTag::video(0, huge)).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Media(MediaError::TagTooLarge(_))
        ));
        assert_eq!(writer.get_ref().len(), 13);
        assert_eq!(writer.tags_written(), 0);
    }

    /// Accepts `budget` bytes, fails once, then accepts everything
    struct FlakySink {
        data: Vec<u8>,
        budget: Option<usize>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(limit) = self.budget {
                let room = limit.saturating_sub(self.data.len());
                if room == 0 {
                    self.budget = None;
                    return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
                }
                let n = buf.len().min(room);
                self.data.extend_from_slice(&buf[..n]);
                return Ok(n);
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_stops_writer_and_prefix_stays_valid() {
        let sink = FlakySink {
            data: Vec::new(),
            // Header, one 17-byte tag, then 5 bytes of the next
            budget: Some(13 + 17 + 5),
        };
        let mut writer = FlvWriter::new(sink, FlvFlags::default()).unwrap();

        writer.encode(&video_tag(0, &[0x17, 0x01])).unwrap();
        assert!(writer.encode(&video_tag(40, &[0x27, 0x01])).is_err());
        assert!(writer.is_failed());

        // The sink would accept this one, but it must not land after a torn tag
        assert!(matches!(
            writer.encode(&video_tag(80, &[0x27, 0x02])),
            Err(crate::Error::Media(MediaError::WriterFailed))
        ));
        assert_eq!(writer.tags_written(), 1);

        let data = writer.into_inner().data;
        assert_eq!(data.len(), 13 + 17 + 5);
        assert_eq!(valid_prefix_len(data.as_slice()), 13 + 17);

        let tags: Vec<RawTag> = FlvReader::new(&data[..13 + 17])
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_valid_prefix_len() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        writer.encode(&video_tag(0, &[0x17, 0x01])).unwrap();
        writer.encode(&video_tag(40, &[0x27, 0x01, 0x02])).unwrap();
        let bytes = writer.into_inner();

        assert_eq!(valid_prefix_len(bytes.as_slice()), bytes.len() as u64);
        assert_eq!(valid_prefix_len(&bytes[..bytes.len() - 1]), 13 + 17);
        assert_eq!(valid_prefix_len(&bytes[..20]), 13);
        assert_eq!(valid_prefix_len(&bytes[..7]), 0);
    }

    #[test]
    fn test_reader_reads_back_in_order() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        // Out-of-order timestamps stay in write order
        writer.encode(&video_tag(40, &[0x17, 0x01])).unwrap();
        writer.encode(&video_tag(20, &[0x27, 0x01])).unwrap();
        writer.encode(&video_tag(30, &[0x27, 0x02])).unwrap();

        let reader = FlvReader::new(Cursor::new(writer.into_inner())).unwrap();
        assert_eq!(reader.flags(), FlvFlags::AUDIO_VIDEO);

        let tags: Vec<RawTag> = reader.collect::<Result<_>>().unwrap();
        let timestamps: Vec<u32> = tags.iter().map(|t| t.timestamp).collect();
        assert_eq!(timestamps, [40, 20, 30]);
        assert_eq!(tags[1].body.as_ref(), &[0x27, 0x01]);

        let typed = TagData::decode(tags[0].tag_type, tags[0].body.clone()).unwrap();
        assert_eq!(typed.tag_type(), FlvTagType::Video);
    }

    #[test]
    fn test_reader_rejects_bad_input() {
        assert!(FlvReader::new(Cursor::new(b"FLX\x01\x05\0\0\0\x09\0\0\0\0".to_vec())).is_err());

        // Corrupt trailer after the first tag
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        writer.encode(&video_tag(0, &[0x17, 0x01])).unwrap();
        let mut bytes = writer.into_inner();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut reader = FlvReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.read_tag(),
            Err(crate::Error::Media(MediaError::PreviousTagSizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_reader_truncated_tag_is_error() {
        let mut writer = FlvWriter::new(Vec::new(), FlvFlags::default()).unwrap();
        writer.encode(&video_tag(0, &[0x17, 0x01])).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(13 + 5);

        let mut reader = FlvReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.read_tag().is_err());
    }
}
