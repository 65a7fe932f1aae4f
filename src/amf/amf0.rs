//! AMF0 encoder and decoder
//!
//! AMF0 is the encoding used by FLV script data tags (`onMetaData`).
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (count hint + key-value pairs until 0x000009)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{AmfObject, AmfValue};
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
///
/// Lenient mode tolerates encoder quirks (missing object end markers,
/// unknown markers). Strict mode only accepts input that [`Amf0Encoder`]
/// reproduces byte for byte.
pub struct Amf0Decoder {
    /// Complex values seen so far; references may only point below this
    complex_values: usize,
    lenient: bool,
    depth: usize,
}

impl Amf0Decoder {
    /// Create a new decoder with default settings
    pub fn new() -> Self {
        Self::with_lenient(true)
    }

    /// Create decoder with explicit lenient mode setting
    pub fn with_lenient(lenient: bool) -> Self {
        Self {
            complex_values: 0,
            lenient,
            depth: 0,
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.complex_values = 0;
        self.depth = 0;
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                ensure(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                ensure(buf, 1)?;
                match buf.get_u8() {
                    0 => Ok(AmfValue::Boolean(false)),
                    1 => Ok(AmfValue::Boolean(true)),
                    // Any other byte would re-encode as 0x01
                    _ if self.lenient => Ok(AmfValue::Boolean(true)),
                    b => Err(AmfError::InvalidBoolean(b)),
                }
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(AmfValue::LongString(read_utf8_long(buf)?)),
            MARKER_OBJECT => {
                self.complex_values += 1;
                Ok(AmfValue::Object(self.decode_properties(buf)?))
            }
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_REFERENCE => {
                ensure(buf, 2)?;
                let index = buf.get_u16();
                if usize::from(index) >= self.complex_values {
                    return Err(AmfError::InvalidReference(index));
                }
                Ok(AmfValue::Reference(index))
            }
            MARKER_ECMA_ARRAY => {
                ensure(buf, 4)?;
                // Count hint is advisory; encoders frequently write 0
                let count = buf.get_u32();
                self.complex_values += 1;
                let properties = self.decode_properties(buf)?;
                Ok(AmfValue::EcmaArray { count, properties })
            }
            MARKER_STRICT_ARRAY => {
                ensure(buf, 4)?;
                let count = buf.get_u32() as usize;
                self.complex_values += 1;
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode(buf)?);
                }
                Ok(AmfValue::StrictArray(elements))
            }
            MARKER_DATE => {
                ensure(buf, 10)?;
                let millis = buf.get_f64();
                let timezone = buf.get_i16();
                Ok(AmfValue::Date { millis, timezone })
            }
            MARKER_UNSUPPORTED => Ok(AmfValue::Unsupported),
            MARKER_XML_DOCUMENT => Ok(AmfValue::Xml(read_utf8_long(buf)?)),
            MARKER_TYPED_OBJECT => {
                let class_name = read_utf8(buf)?;
                self.complex_values += 1;
                let properties = self.decode_properties(buf)?;
                Ok(AmfValue::TypedObject {
                    class_name,
                    properties,
                })
            }
            MARKER_AVMPLUS if self.lenient => Ok(AmfValue::Null),
            MARKER_AVMPLUS => Err(AmfError::UnsupportedMarker(marker)),
            _ if self.lenient => Ok(AmfValue::Undefined),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    /// Key-value pairs terminated by an empty key and the object end marker
    fn decode_properties(&mut self, buf: &mut Bytes) -> Result<AmfObject, AmfError> {
        let mut properties = AmfObject::new();

        loop {
            if self.lenient && buf.is_empty() {
                // OBS sometimes omits the object end marker
                break;
            }

            let key = read_utf8(buf)?;
            if key.is_empty() {
                if buf.is_empty() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                match buf.get_u8() {
                    MARKER_OBJECT_END => break,
                    _ if self.lenient => break,
                    _ => return Err(AmfError::InvalidObjectEnd),
                }
            }

            let value = self.decode(buf)?;
            properties.push(key, value);
        }

        Ok(properties)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure(buf: &Bytes, len: usize) -> Result<(), AmfError> {
    if buf.remaining() < len {
        Err(AmfError::UnexpectedEof)
    } else {
        Ok(())
    }
}

/// Read UTF-8 string with 16-bit length prefix
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Read UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 4)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len)?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        encode_into(&mut self.buf, value);
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the AMF0 encoding of `value` to `buf`
pub fn encode_into(buf: &mut BytesMut, value: &AmfValue) {
    match value {
        AmfValue::Number(n) => {
            buf.put_u8(MARKER_NUMBER);
            buf.put_f64(*n);
        }
        AmfValue::Boolean(b) => {
            buf.put_u8(MARKER_BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        AmfValue::String(s) if s.len() > 0xFFFF => {
            buf.put_u8(MARKER_LONG_STRING);
            write_utf8_long(buf, s);
        }
        AmfValue::String(s) => {
            buf.put_u8(MARKER_STRING);
            write_utf8(buf, s);
        }
        AmfValue::LongString(s) => {
            buf.put_u8(MARKER_LONG_STRING);
            write_utf8_long(buf, s);
        }
        AmfValue::Object(props) => {
            buf.put_u8(MARKER_OBJECT);
            write_properties(buf, props);
        }
        AmfValue::Null => buf.put_u8(MARKER_NULL),
        AmfValue::Undefined => buf.put_u8(MARKER_UNDEFINED),
        AmfValue::Reference(index) => {
            buf.put_u8(MARKER_REFERENCE);
            buf.put_u16(*index);
        }
        AmfValue::EcmaArray { count, properties } => {
            buf.put_u8(MARKER_ECMA_ARRAY);
            buf.put_u32(*count);
            write_properties(buf, properties);
        }
        AmfValue::StrictArray(elements) => {
            buf.put_u8(MARKER_STRICT_ARRAY);
            buf.put_u32(elements.len() as u32);
            for elem in elements {
                encode_into(buf, elem);
            }
        }
        AmfValue::Date { millis, timezone } => {
            buf.put_u8(MARKER_DATE);
            buf.put_f64(*millis);
            buf.put_i16(*timezone);
        }
        AmfValue::Unsupported => buf.put_u8(MARKER_UNSUPPORTED),
        AmfValue::Xml(s) => {
            buf.put_u8(MARKER_XML_DOCUMENT);
            write_utf8_long(buf, s);
        }
        AmfValue::TypedObject {
            class_name,
            properties,
        } => {
            buf.put_u8(MARKER_TYPED_OBJECT);
            write_utf8(buf, class_name);
            write_properties(buf, properties);
        }
    }
}

fn write_properties(buf: &mut BytesMut, props: &AmfObject) {
    for (key, val) in props.iter() {
        write_utf8(buf, key);
        encode_into(buf, val);
    }
    buf.put_u16(0);
    buf.put_u8(MARKER_OBJECT_END);
}

/// Write UTF-8 string with 16-bit length prefix (no type marker)
fn write_utf8(buf: &mut BytesMut, s: &str) {
    let len = s.len().min(0xFFFF);
    buf.put_u16(len as u16);
    buf.put_slice(&s.as_bytes()[..len]);
}

fn write_utf8_long(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Convenience function to encode a single value
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode a single value (lenient)
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values (lenient)
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
