//! AMF0 support for FLV script data
//!
//! Script data tags carry AMF0-encoded values, typically the
//! `onMetaData` name followed by an ECMA array of stream properties.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::{AmfObject, AmfValue};
