//! AMF0 value types
//!
//! Script data tags are re-encoded after decoding, so values keep
//! everything needed to reproduce the original bytes: property order,
//! the ECMA array count hint, date timezones and the string marker width.

/// Ordered key-value properties
///
/// AMF objects are serialized in property order. A map would lose that
/// order and change the re-encoded bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmfObject {
    properties: Vec<(String, AmfValue)>,
}

impl AmfObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the first property with the given key
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a property, replacing an existing one in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AmfValue>) {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key, value)),
        }
    }

    /// Append a property without checking for duplicates (decoder path)
    pub(crate) fn push(&mut self, key: String, value: AmfValue) {
        self.properties.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AmfValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<AmfValue>> FromIterator<(K, V)> for AmfObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = AmfObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

/// AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// 0x00
    Number(f64),

    /// 0x01
    Boolean(bool),

    /// 0x02, 16-bit length prefix (0x0C is used when the string outgrows it)
    String(String),

    /// 0x0C, 32-bit length prefix
    LongString(String),

    /// 0x03
    Object(AmfObject),

    /// 0x05
    Null,

    /// 0x06
    Undefined,

    /// 0x07, index into the per-message reference table
    Reference(u16),

    /// 0x08, associative array with its (advisory) count hint
    EcmaArray { count: u32, properties: AmfObject },

    /// 0x0A
    StrictArray(Vec<AmfValue>),

    /// 0x0B, milliseconds since the Unix epoch plus the legacy timezone field
    Date { millis: f64, timezone: i16 },

    /// 0x0D
    Unsupported,

    /// 0x0F
    Xml(String),

    /// 0x10
    TypedObject {
        class_name: String,
        properties: AmfObject,
    },
}

impl AmfValue {
    /// Build an ECMA array whose count hint matches its properties
    pub fn ecma_array(properties: AmfObject) -> Self {
        AmfValue::EcmaArray {
            count: properties.len() as u32,
            properties,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) | AmfValue::LongString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Properties of an object, ECMA array or typed object
    pub fn as_object(&self) -> Option<&AmfObject> {
        match self {
            AmfValue::Object(m) => Some(m),
            AmfValue::EcmaArray { properties, .. } => Some(properties),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::StrictArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<AmfObject> for AmfValue {
    fn from(v: AmfObject) -> Self {
        AmfValue::Object(v)
    }
}
