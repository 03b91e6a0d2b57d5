//! The question section entry.

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;
use crate::record::CLASS_IN;

/// Top bit of the question class: "unicast response requested" (RFC 6762 §5.4).
pub const QU_BIT: u16 = 0x8000;

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    pub query_type: u16,
    /// Raw class as sent, QU bit included.
    pub query_class: u16,
}

impl Question {
    pub fn new(name: impl Into<String>, query_type: u16, query_class: u16) -> Self {
        Self {
            name: name.into(),
            query_type,
            query_class,
        }
    }

    /// A class-IN question.
    pub fn internet(name: impl Into<String>, query_type: u16) -> Self {
        Self::new(name, query_type, CLASS_IN)
    }

    /// Set the QU bit.
    #[must_use]
    pub fn with_unicast_response(mut self) -> Self {
        self.query_class |= QU_BIT;
        self
    }

    pub fn unicast_response_requested(&self) -> bool {
        self.query_class & QU_BIT != 0
    }

    /// The class being asked about, with the QU bit stripped when set.
    pub fn class(&self) -> u16 {
        if self.unicast_response_requested() {
            self.query_class & !QU_BIT
        } else {
            self.query_class
        }
    }

    pub fn write_to(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.put_name(&self.name)?;
        w.put_u16(self.query_type);
        w.put_u16(self.query_class);
        Ok(())
    }

    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let name = r.read_name()?;
        let query_type = r.read_u16()?;
        let query_class = r.read_u16()?;
        Ok(Self {
            name,
            query_type,
            query_class,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CLASS_ANY, TYPE_PTR};

    #[test]
    fn qu_bit_is_read_from_class() {
        let q = Question::internet("_pagecache._tcp", TYPE_PTR);
        assert!(!q.unicast_response_requested());
        assert_eq!(q.class(), CLASS_IN);

        let qu = q.with_unicast_response();
        assert!(qu.unicast_response_requested());
        assert_eq!(qu.query_class, 0x8001);
        assert_eq!(qu.class(), CLASS_IN);
    }

    #[test]
    fn class_without_qu_is_untouched() {
        let q = Question::new("x.local", TYPE_PTR, CLASS_ANY);
        assert_eq!(q.class(), CLASS_ANY);
    }

    #[test]
    fn wire_layout() {
        let q = Question::internet("a.local", TYPE_PTR).with_unicast_response();
        let mut w = ByteWriter::new();
        q.write_to(&mut w).unwrap();
        assert_eq!(
            w.as_bytes(),
            &[1, b'a', 5, b'l', b'o', b'c', b'a', b'l', 0, 0x00, 0x0C, 0x80, 0x01]
        );
        let mut r = ByteReader::new(w.as_bytes());
        assert_eq!(Question::parse(&mut r).unwrap(), q);
    }
}
