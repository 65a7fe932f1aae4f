//! Output file of a publishing session

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::container::{valid_prefix_len, FlvFlags, FlvWriter};
use crate::media::flv::FlvTag;

/// An open recording: one file, one writer
#[derive(Debug)]
pub struct Recording {
    path: PathBuf,
    writer: FlvWriter<BufWriter<File>>,
}

impl Recording {
    /// Create (or truncate) `path` and write the FLV header
    pub fn create(path: PathBuf, flags: FlvFlags, buffer_size: usize) -> Result<Self> {
        let file = File::create(&path)?;
        let writer = FlvWriter::new(BufWriter::with_capacity(buffer_size, file), flags)?;
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, tag: &FlvTag) -> Result<()> {
        self.writer.encode(tag)
    }

    pub fn tags_written(&self) -> u64 {
        self.writer.tags_written()
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes_written()
    }

    /// Flush buffered tags and close the file
    ///
    /// After a failed write the file is cut back to its last complete tag.
    pub fn finish(self) -> Result<()> {
        let Recording { path, writer } = self;
        if !writer.is_failed() {
            let file = writer.into_inner().into_inner().map_err(|e| e.into_error())?;
            drop(file);
            return Ok(());
        }

        // Whatever still flushes is kept if it forms whole tags
        let _ = writer.into_inner().into_inner();
        let len = trim_to_last_tag(&path)?;
        tracing::warn!(path = %path.display(), len, "Recording cut back to last complete tag");
        Ok(())
    }
}

/// Truncate `path` to its longest valid FLV prefix and return the new length
fn trim_to_last_tag(path: &Path) -> Result<u64> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = valid_prefix_len(BufReader::new(&file));
    file.set_len(len)?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfValue;
    use crate::media::container::FlvReader;
    use crate::media::flv::{FlvTagType, ScriptData};

    #[test]
    fn test_create_write_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.flv");

        let mut recording = Recording::create(path.clone(), FlvFlags::AUDIO_VIDEO, 16).unwrap();
        let script = ScriptData {
            values: vec![AmfValue::from("onMetaData"), AmfValue::Null],
        };
        recording.write(&FlvTag::script(0, script)).unwrap();
        assert_eq!(recording.tags_written(), 1);
        let expected_len = recording.bytes_written();
        recording.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, expected_len);

        let mut reader = FlvReader::new(bytes.as_slice()).unwrap();
        let tag = reader.read_tag().unwrap().unwrap();
        assert_eq!(tag.tag_type, FlvTagType::Script);
        assert!(reader.read_tag().unwrap().is_none());
    }

    #[test]
    fn test_trim_drops_torn_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.flv");

        let mut recording = Recording::create(path.clone(), FlvFlags::AUDIO_VIDEO, 0).unwrap();
        let script = ScriptData {
            values: vec![AmfValue::from("onMetaData"), AmfValue::Null],
        };
        recording.write(&FlvTag::script(0, script)).unwrap();
        let good_len = recording.bytes_written();
        recording.finish().unwrap();

        // Simulate a write that stopped partway through the next tag
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0x09, 0x00, 0x00, 0x20, 0x00]);
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(trim_to_last_tag(&path).unwrap(), good_len);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.flv");
        std::fs::write(&path, vec![0xAA; 4096]).unwrap();

        Recording::create(path.clone(), FlvFlags::AUDIO_VIDEO, 0)
            .unwrap()
            .finish()
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap().len(), 13);
    }
}
