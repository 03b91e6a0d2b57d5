//! A complete DNS message: header, questions and the three record sections.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;
use crate::flags::Flags;
use crate::question::Question;
use crate::record::ResourceRecord;

/// The fixed header is always exactly this long.
pub const HEADER_LEN: usize = 12;

/// One DNS-format packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Ignored by mDNS receivers.
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    pub fn new(id: u16, flags: Flags) -> Self {
        Self {
            id,
            flags,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// A single-question query with an all-zero header.
    pub fn query(question: Question) -> Self {
        let mut msg = Self::new(0, Flags::QUERY);
        msg.questions.push(question);
        msg
    }

    /// An authoritative response carrying `answers` and no questions
    /// (RFC 6762 §6).
    pub fn response(answers: Vec<ResourceRecord>) -> Self {
        let mut msg = Self::new(0, Flags::RESPONSE);
        msg.answers = answers;
        msg
    }

    pub fn is_query(&self) -> bool {
        self.flags.is_query
    }

    /// All records, in section order.
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
    }

    /// Serialise without name compression.
    ///
    /// # Panics
    ///
    /// If the header comes out at any length other than [`HEADER_LEN`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut w = ByteWriter::with_capacity(512);
        w.put_u16(self.id);
        w.put_u16(self.flags.to_u16());
        w.put_u16(section_len("questions", self.questions.len())?);
        w.put_u16(section_len("answers", self.answers.len())?);
        w.put_u16(section_len("authority", self.authority.len())?);
        w.put_u16(section_len("additional", self.additional.len())?);
        assert_eq!(w.len(), HEADER_LEN, "DNS header must be exactly 12 bytes");

        for q in &self.questions {
            q.write_to(&mut w)?;
        }
        for rec in self.records() {
            rec.write_to(&mut w)?;
        }
        Ok(w.into_bytes())
    }

    /// Parse a whole datagram. Any bad question or record rejects the packet.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::parse_from(&mut ByteReader::new(bytes))
    }

    pub fn parse_from(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let id = r.read_u16()?;
        let flags = Flags::from_u16(r.read_u16()?);
        let qdcount = r.read_u16()?;
        let ancount = r.read_u16()?;
        let nscount = r.read_u16()?;
        let arcount = r.read_u16()?;
        trace!(id, qdcount, ancount, nscount, arcount, "parsing message");

        let mut msg = Self::new(id, flags);
        msg.questions = (0..qdcount)
            .map(|_| Question::parse(r))
            .collect::<Result<_, _>>()?;
        msg.answers = parse_records(r, ancount)?;
        msg.authority = parse_records(r, nscount)?;
        msg.additional = parse_records(r, arcount)?;
        Ok(msg)
    }
}

fn section_len(section: &'static str, count: usize) -> Result<u16, ProtocolError> {
    u16::try_from(count).map_err(|_| ProtocolError::TooManyRecords { section, count })
}

fn parse_records(r: &mut ByteReader<'_>, count: u16) -> Result<Vec<ResourceRecord>, ProtocolError> {
    (0..count).map(|_| ResourceRecord::parse(r)).collect()
}
