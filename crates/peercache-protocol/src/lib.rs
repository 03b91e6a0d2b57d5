//! mDNS/DNS-SD wire format for peercache.
//!
//! This crate handles the bit-exact binary encoding of DNS messages
//! (RFC 1035 framing as used by RFC 6762/6763): the byte-level codec, the
//! header flag word, questions, and the A/PTR/SRV resource records peercache
//! publishes and looks up.

pub mod codec;
pub mod error;
pub mod flags;
pub mod message;
pub mod question;
pub mod record;

pub use codec::{ByteReader, ByteWriter};
pub use error::{ProtocolError, ValidationError};
pub use flags::{Flags, Nibble};
pub use message::{Message, HEADER_LEN};
pub use question::{Question, QU_BIT};
pub use record::{
    RecordData, ResourceRecord, CACHE_FLUSH_BIT, CLASS_ANY, CLASS_IN, DEFAULT_TTL, TYPE_A,
    TYPE_ANY, TYPE_PTR, TYPE_SRV,
};

/// DNS-SD service type enumeration name (RFC 6763 §9).
pub const DNSSD_ENUMERATION_NAME: &str = "_services._dns-sd._udp.local";
