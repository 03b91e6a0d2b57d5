//! Wire and validation errors.

use thiserror::Error;

/// A fixed-width header field was given a value it cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} out of range: {value} does not fit in {bits} bits")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: u32,
    pub bits: u32,
}

/// Malformed or unsupported bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("label too long: {0} bytes (max 63)")]
    LabelTooLong(usize),

    #[error("name too long: {0} bytes encoded (max 255)")]
    NameTooLong(usize),

    #[error("record data too long: {0} bytes")]
    RecordTooLong(usize),

    #[error("empty label in name {0:?}")]
    EmptyLabel(String),

    #[error("unexpected end of message at offset {offset}: wanted {wanted} bytes")]
    UnexpectedEnd { offset: usize, wanted: usize },

    #[error("unsupported record type: {0}")]
    UnsupportedRecordType(u16),

    #[error("bad compression pointer {pointer:#06x} at offset {offset}")]
    BadPointer { pointer: u16, offset: usize },

    #[error("reserved label type {0:#04x}")]
    ReservedLabelType(u8),

    #[error("record data length mismatch for type {rtype}: header says {declared}, read {actual}")]
    BadRecordLength {
        rtype: u16,
        declared: usize,
        actual: usize,
    },

    #[error("name is not valid UTF-8")]
    InvalidUtf8,

    #[error("too many entries in {section}: {count}")]
    TooManyRecords { section: &'static str, count: usize },

    #[error("string too long for a length byte: {0} bytes")]
    StringTooLong(usize),

    #[error("serialisation error: {0}")]
    Serialization(String),
}
