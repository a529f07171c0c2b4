//! # Record Types
//!
//! Schema, field values and the codec configuration shared by the decoder
//! and the encoder.

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{GroundlinkError, Result};

/// Default field delimiter
pub const DEFAULT_DELIMITER: &str = ",";

/// A decoded field value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Missing or empty field
    Absent,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce raw field text into a typed value
    ///
    /// Empty text is `Absent`. Text with a decimal point is tried as a real,
    /// anything else as an integer; surrounding whitespace is ignored for
    /// both. Text that fails to parse stays text as received, so coercion
    /// never fails.
    pub fn coerce(raw: &str) -> Self {
        if raw.is_empty() {
            return FieldValue::Absent;
        }
        let number = raw.trim();
        if number.contains('.') {
            match number.parse::<f64>() {
                Ok(v) => FieldValue::Real(v),
                Err(_) => FieldValue::Text(raw.to_string()),
            }
        } else {
            match number.parse::<i64>() {
                Ok(v) => FieldValue::Integer(v),
                Err(_) => FieldValue::Text(raw.to_string()),
            }
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Numeric view of the value; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    /// Wire form: absent is empty and reals always carry a decimal point
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Absent => Ok(()),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => {
                let text = v.to_string();
                if v.is_finite() && !text.contains('.') {
                    write!(f, "{}.0", text)
                } else {
                    f.write_str(&text)
                }
            }
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Ordered field names defining record arity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Arc<[String]>,
}

impl Schema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// A fully shaped record: one value per schema field, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Schema,
    values: Vec<FieldValue>,
}

impl Record {
    /// All-absent record of schema length
    pub fn blank(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
            values: vec![FieldValue::Absent; schema.len()],
        }
    }

    /// Build a record from values in schema order
    ///
    /// # Errors
    ///
    /// Returns `Constructor` if the value count differs from the schema length
    pub fn from_values(schema: &Schema, values: Vec<FieldValue>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(GroundlinkError::Constructor(format!(
                "record has {} values but schema has {} fields",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self {
            schema: schema.clone(),
            values,
        })
    }

    /// Record from leading values, remaining fields absent
    pub(crate) fn padded(schema: &Schema, mut values: Vec<FieldValue>) -> Self {
        values.resize(schema.len(), FieldValue::Absent);
        Self {
            schema: schema.clone(),
            values,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Set a field by name; returns false if the schema has no such field
    pub fn set(&mut self, name: &str, value: FieldValue) -> bool {
        match self.schema.index_of(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// True when every field is absent (e.g. a frame that failed to decode)
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(FieldValue::is_absent)
    }

    /// Values in their wire form, absent as empty strings
    pub fn to_row(&self) -> Vec<String> {
        self.values.iter().map(ToString::to_string).collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Codec construction options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    pub delimiter: String,
    pub header: Option<String>,
    pub tail: Option<String>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            header: None,
            tail: None,
        }
    }
}

/// How a message is wrapped around its delimited payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Framing {
    Plain,
    Prefixed { header: String },
    Wrapped { header: String, tail: String },
}

/// Delimited text codec bound to a schema
#[derive(Debug, Clone)]
pub struct RecordCodec {
    pub(crate) schema: Schema,
    pub(crate) delimiter: String,
    pub(crate) framing: Framing,
}

impl RecordCodec {
    /// Create a codec
    ///
    /// Empty header or tail strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns `Constructor` if the delimiter is empty or a tail is
    /// configured without a header
    pub fn new(schema: Schema, options: CodecOptions) -> Result<Self> {
        if options.delimiter.is_empty() {
            return Err(GroundlinkError::Constructor(
                "delimiter cannot be empty".to_string(),
            ));
        }

        let header = options.header.filter(|h| !h.is_empty());
        let tail = options.tail.filter(|t| !t.is_empty());
        let framing = match (header, tail) {
            (None, None) => Framing::Plain,
            (Some(header), None) => Framing::Prefixed { header },
            (Some(header), Some(tail)) => Framing::Wrapped { header, tail },
            (None, Some(_)) => {
                return Err(GroundlinkError::Constructor(
                    "tail is set but header is not".to_string(),
                ))
            }
        };

        Ok(Self {
            schema,
            delimiter: options.delimiter,
            framing,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn header(&self) -> Option<&str> {
        match &self.framing {
            Framing::Plain => None,
            Framing::Prefixed { header } | Framing::Wrapped { header, .. } => Some(header),
        }
    }

    pub fn tail(&self) -> Option<&str> {
        match &self.framing {
            Framing::Wrapped { tail, .. } => Some(tail),
            _ => None,
        }
    }
}
