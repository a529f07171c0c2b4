//! # Record Codec Module
//!
//! Delimited text records bound to an ordered schema.
//!
//! This module handles:
//! - Typed field values (absent, integer, real, text)
//! - Decoding framed messages with optional header and tail
//! - Encoding records back into the same wire form

pub mod protocol;
pub mod encoder;
pub mod decoder;

pub use protocol::{CodecOptions, FieldValue, Record, RecordCodec, Schema, DEFAULT_DELIMITER};
