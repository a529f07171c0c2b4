//! # Record Decoder
//!
//! Decodes framed text messages into schema-shaped records.

use super::protocol::{FieldValue, Framing, Record, RecordCodec};

impl RecordCodec {
    /// Decode a message into a record
    ///
    /// A message whose header or tail does not match yields an all-absent
    /// record of schema length; decoding never fails. Missing trailing
    /// fields are absent and surplus fields are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use groundlink::codec::{CodecOptions, FieldValue, RecordCodec, Schema};
    ///
    /// let codec = RecordCodec::new(Schema::new(["a", "b", "c"]), CodecOptions::default()).unwrap();
    /// let record = codec.decode("1,2");
    /// assert_eq!(record.get("a"), Some(&FieldValue::Integer(1)));
    /// assert_eq!(record.get("c"), Some(&FieldValue::Absent));
    /// ```
    pub fn decode(&self, message: &str) -> Record {
        match &self.framing {
            Framing::Plain => self.decode_payload(message),
            Framing::Prefixed { header } => self.decode_prefixed(message, header),
            Framing::Wrapped { header, tail } => match message.strip_suffix(tail.as_str()) {
                Some(rest) => self.decode_prefixed(rest, header),
                None => Record::blank(&self.schema),
            },
        }
    }

    fn decode_prefixed(&self, message: &str, header: &str) -> Record {
        match message.strip_prefix(header) {
            Some(payload) => self.decode_payload(payload),
            None => Record::blank(&self.schema),
        }
    }

    fn decode_payload(&self, payload: &str) -> Record {
        let values = payload
            .split(self.delimiter.as_str())
            .take(self.schema.len())
            .map(FieldValue::coerce)
            .collect();
        Record::padded(&self.schema, values)
    }
}
