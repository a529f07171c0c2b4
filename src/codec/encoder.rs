//! # Record Encoder
//!
//! Encodes records back into framed text messages.

use super::protocol::{FieldValue, Framing, Record, RecordCodec};

impl RecordCodec {
    /// Encode a record into a message (without terminator)
    ///
    /// Absent fields render as empty strings. The header and tail are added
    /// when configured.
    pub fn encode(&self, record: &Record) -> String {
        self.wrap(record.to_row().join(&self.delimiter))
    }

    /// Encode named values, filling omitted fields with absent
    ///
    /// Names that are not in the schema are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use groundlink::codec::{CodecOptions, FieldValue, RecordCodec, Schema};
    ///
    /// let options = CodecOptions { header: Some("DEV0,".to_string()), ..CodecOptions::default() };
    /// let codec = RecordCodec::new(Schema::new(["a", "b", "c"]), options).unwrap();
    /// let message = codec.encode_fields([("c", FieldValue::Integer(3)), ("a", FieldValue::Real(1.5))]);
    /// assert_eq!(message, "DEV0,1.5,,3");
    /// ```
    pub fn encode_fields<'a, I>(&self, fields: I) -> String
    where
        I: IntoIterator<Item = (&'a str, FieldValue)>,
    {
        let mut record = Record::blank(&self.schema);
        for (name, value) in fields {
            record.set(name, value);
        }
        self.encode(&record)
    }

    fn wrap(&self, payload: String) -> String {
        match &self.framing {
            Framing::Plain => payload,
            Framing::Prefixed { header } => format!("{}{}", header, payload),
            Framing::Wrapped { header, tail } => format!("{}{}{}", header, payload, tail),
        }
    }
}
