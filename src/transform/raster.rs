//! Decode / transform / re-encode pipeline
//!
//! A [`RasterPipeline`] splits a [`FrameTransform`] into a codec half and a
//! visual half so each can be swapped independently. The defaults keep the
//! compressed sample as its own "raster", which records every key frame
//! unchanged.

use bytes::Bytes;

use super::FrameTransform;
use crate::error::TransformError;
use crate::media::flv::VideoCodec;
use crate::media::h264::NaluIterator;

/// A decoded picture, or whatever intermediate form the codec produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub data: Bytes,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Raster {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            width: None,
            height: None,
        }
    }
}

/// Converts between compressed samples and rasters
pub trait RasterCodec: Send + Sync {
    fn decode(&self, sample: Bytes) -> Result<Raster, TransformError>;

    /// Decode a sample whose NALU length prefixes are `nalu_length_size` wide
    fn decode_framed(&self, sample: Bytes, nalu_length_size: u8) -> Result<Raster, TransformError> {
        let _ = nalu_length_size;
        self.decode(sample)
    }

    fn encode(&self, raster: Raster) -> Result<Bytes, TransformError>;
}

/// Image-level operation applied between decode and encode
pub trait VisualTransform: Send + Sync {
    fn apply(&self, raster: Raster) -> Result<Raster, TransformError>;
}

/// Codec that checks AVCC framing and carries the NAL units through as is
#[derive(Debug, Clone, Copy)]
pub struct NaluPassthrough {
    length_size: u8,
}

impl NaluPassthrough {
    /// `length_size` is the NALU length prefix width (1, 2 or 4 bytes)
    pub fn new(length_size: u8) -> Self {
        Self { length_size }
    }
}

impl Default for NaluPassthrough {
    fn default() -> Self {
        Self::new(4)
    }
}

impl RasterCodec for NaluPassthrough {
    fn decode(&self, sample: Bytes) -> Result<Raster, TransformError> {
        let prefix = self.length_size as usize;
        let mut consumed = 0;
        let mut count = 0;
        for nalu in NaluIterator::new(&sample, self.length_size) {
            consumed += prefix + nalu.len();
            count += 1;
        }

        if count == 0 {
            return Err(TransformError::Decode("sample contains no NAL units".into()));
        }
        if consumed != sample.len() {
            return Err(TransformError::Decode(format!(
                "truncated NAL unit at offset {}",
                consumed
            )));
        }
        Ok(Raster::new(sample))
    }

    fn decode_framed(&self, sample: Bytes, nalu_length_size: u8) -> Result<Raster, TransformError> {
        NaluPassthrough::new(nalu_length_size).decode(sample)
    }

    fn encode(&self, raster: Raster) -> Result<Bytes, TransformError> {
        Ok(raster.data)
    }
}

/// Visual transform that leaves the raster untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl VisualTransform for Identity {
    fn apply(&self, raster: Raster) -> Result<Raster, TransformError> {
        Ok(raster)
    }
}

/// [`FrameTransform`] built from a codec and a visual transform
#[derive(Debug, Clone, Default)]
pub struct RasterPipeline<C = NaluPassthrough, V = Identity> {
    codec: C,
    visual: V,
}

impl RasterPipeline {
    /// Pipeline that checks AVCC framing and records samples unchanged
    pub fn passthrough() -> Self {
        Self::new(NaluPassthrough::default(), Identity)
    }
}

impl<C: RasterCodec, V: VisualTransform> RasterPipeline<C, V> {
    pub fn new(codec: C, visual: V) -> Self {
        Self { codec, visual }
    }

    fn finish(&self, raster: Raster) -> Result<Bytes, TransformError> {
        let raster = self.visual.apply(raster)?;
        self.codec.encode(raster)
    }
}

impl<C: RasterCodec, V: VisualTransform> FrameTransform for RasterPipeline<C, V> {
    fn transform(&self, sample: Bytes, codec: VideoCodec) -> Result<Bytes, TransformError> {
        if codec != VideoCodec::Avc {
            return Err(TransformError::Decode(format!("unsupported codec {:?}", codec)));
        }

        let raster = self.codec.decode(sample)?;
        self.finish(raster)
    }

    fn transform_framed(
        &self,
        sample: Bytes,
        codec: VideoCodec,
        nalu_length_size: u8,
    ) -> Result<Bytes, TransformError> {
        if codec != VideoCodec::Avc {
            return Err(TransformError::Decode(format!("unsupported codec {:?}", codec)));
        }

        let raster = self.codec.decode_framed(sample, nalu_length_size)?;
        self.finish(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_NALUS: &[u8] = &[
        0x00, 0x00, 0x00, 0x02, 0x65, 0x88, // IDR slice
        0x00, 0x00, 0x00, 0x01, 0x06, // SEI
    ];

    struct Blank;

    impl VisualTransform for Blank {
        fn apply(&self, raster: Raster) -> Result<Raster, TransformError> {
            Ok(Raster {
                data: Bytes::from(vec![0u8; raster.data.len()]),
                ..raster
            })
        }
    }

    struct Reject;

    impl VisualTransform for Reject {
        fn apply(&self, _raster: Raster) -> Result<Raster, TransformError> {
            Err(TransformError::Apply("unsupported resolution".into()))
        }
    }

    #[test]
    fn test_default_pipeline_is_identity() {
        let pipeline = RasterPipeline::passthrough();
        let sample = Bytes::from_static(TWO_NALUS);

        let out = pipeline.transform(sample.clone(), VideoCodec::Avc).unwrap();
        assert_eq!(out, sample);
    }

    #[test]
    fn test_passthrough_rejects_bad_framing() {
        let codec = NaluPassthrough::default();

        assert!(matches!(
            codec.decode(Bytes::new()),
            Err(TransformError::Decode(_))
        ));
        // Length says 16 bytes, only 2 follow
        assert!(matches!(
            codec.decode(Bytes::from_static(&[0x00, 0x00, 0x00, 0x10, 0x65, 0x88])),
            Err(TransformError::Decode(_))
        ));
        // Trailing garbage after a complete NALU
        assert!(matches!(
            codec.decode(Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x00])),
            Err(TransformError::Decode(_))
        ));
    }

    #[test]
    fn test_passthrough_length_size() {
        let codec = NaluPassthrough::new(2);
        let raster = codec
            .decode(Bytes::from_static(&[0x00, 0x01, 0x65, 0x00, 0x01, 0x41]))
            .unwrap();
        assert_eq!(raster.data.len(), 6);
        assert_eq!(raster.width, None);
    }

    #[test]
    fn test_announced_length_size_overrides_codec_default() {
        let pipeline = RasterPipeline::passthrough();
        let sample = Bytes::from_static(&[0x00, 0x02, 0x65, 0x88]);

        assert!(pipeline.transform(sample.clone(), VideoCodec::Avc).is_err());
        let out = pipeline
            .transform_framed(sample.clone(), VideoCodec::Avc, 2)
            .unwrap();
        assert_eq!(out, sample);
    }

    #[test]
    fn test_visual_transform_runs_between_codec_steps() {
        let pipeline = RasterPipeline::new(NaluPassthrough::new(1), Blank);
        let out = pipeline
            .transform(Bytes::from_static(&[0x02, 0x65, 0x88]), VideoCodec::Avc)
            .unwrap();
        assert_eq!(out.as_ref(), &[0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_visual_error_propagates() {
        let pipeline = RasterPipeline::new(NaluPassthrough::default(), Reject);
        let err = pipeline
            .transform(Bytes::from_static(TWO_NALUS), VideoCodec::Avc)
            .unwrap_err();
        assert_eq!(err, TransformError::Apply("unsupported resolution".into()));
    }

    #[test]
    fn test_non_avc_rejected() {
        let pipeline = RasterPipeline::passthrough();
        assert!(pipeline
            .transform(Bytes::from_static(TWO_NALUS), VideoCodec::Hevc)
            .is_err());
    }
}
