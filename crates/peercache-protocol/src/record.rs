//! Resource records: A, PTR and SRV.
//!
//! Every record is written as
//!
//! ```text
//! NAME  TYPE(2)  CLASS(2)  TTL(4)  RDLENGTH(2)  RDATA(RDLENGTH)
//! ```
//!
//! Parsing peeks the type behind the name and dispatches to the matching
//! payload parser; any other type rejects the packet.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

pub const TYPE_A: u16 = 1;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_SRV: u16 = 33;
/// Query-only wildcard type.
pub const TYPE_ANY: u16 = 255;

pub const CLASS_IN: u16 = 1;
/// Query-only wildcard class.
pub const CLASS_ANY: u16 = 255;
/// Top bit of an answer's class: the cache-flush flag (RFC 6762 §10.2).
pub const CACHE_FLUSH_BIT: u16 = 0x8000;

/// Default TTL for records we publish (RFC 6762 §10 recommends 120s for
/// host-related records).
pub const DEFAULT_TTL: u32 = 120;

/// Type-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecordData {
    #[serde(rename = "A")]
    A { ip_address: Ipv4Addr },
    /// The owner name is the service type.
    #[serde(rename = "PTR")]
    Ptr { instance_name: String },
    /// The owner name is the full instance name.
    #[serde(rename = "SRV")]
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target_domain: String,
    },
}

impl RecordData {
    pub fn record_type(&self) -> u16 {
        match self {
            Self::A { .. } => TYPE_A,
            Self::Ptr { .. } => TYPE_PTR,
            Self::Srv { .. } => TYPE_SRV,
        }
    }
}

/// One resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    record_class: u16,
    pub ttl_seconds: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    fn with_data(name: impl Into<String>, ttl_seconds: u32, data: RecordData) -> Self {
        Self {
            name: name.into(),
            record_class: CLASS_IN,
            ttl_seconds,
            data,
        }
    }

    /// Host address record.
    pub fn a(name: impl Into<String>, ip_address: Ipv4Addr, ttl_seconds: u32) -> Self {
        Self::with_data(name, ttl_seconds, RecordData::A { ip_address })
    }

    /// `service_type -> instance_name`.
    pub fn ptr(
        service_type: impl Into<String>,
        instance_name: impl Into<String>,
        ttl_seconds: u32,
    ) -> Self {
        Self::with_data(
            service_type,
            ttl_seconds,
            RecordData::Ptr {
                instance_name: instance_name.into(),
            },
        )
    }

    /// `instance -> target_domain:port`. Always class IN.
    pub fn srv(
        instance_type_domain: impl Into<String>,
        priority: u16,
        weight: u16,
        port: u16,
        target_domain: impl Into<String>,
        ttl_seconds: u32,
    ) -> Self {
        Self::with_data(
            instance_type_domain,
            ttl_seconds,
            RecordData::Srv {
                priority,
                weight,
                port,
                target_domain: target_domain.into(),
            },
        )
    }

    /// Override the class. SRV records ignore this and stay IN.
    #[must_use]
    pub fn with_class(mut self, record_class: u16) -> Self {
        if !matches!(self.data, RecordData::Srv { .. }) {
            self.record_class = record_class;
        }
        self
    }

    pub fn record_type(&self) -> u16 {
        self.data.record_type()
    }

    pub fn record_class(&self) -> u16 {
        self.record_class
    }

    /// JSON rendering used in error messages and CLI output.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn write_to(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.put_name(&self.name)?;
        w.put_u16(self.record_type());
        w.put_u16(self.record_class);
        w.put_u32(self.ttl_seconds);

        let length_at = w.len();
        w.put_u16(0);
        let start = w.len();
        match &self.data {
            RecordData::A { ip_address } => w.put_bytes(&ip_address.octets()),
            RecordData::Ptr { instance_name } => w.put_name(instance_name)?,
            RecordData::Srv {
                priority,
                weight,
                port,
                target_domain,
            } => {
                w.put_u16(*priority);
                w.put_u16(*weight);
                w.put_u16(*port);
                w.put_name(target_domain)?;
            }
        }
        let rdlength = w.len() - start;
        let rdlength =
            u16::try_from(rdlength).map_err(|_| ProtocolError::RecordTooLong(rdlength))?;
        w.patch_u16(length_at, rdlength);
        Ok(())
    }

    /// Parse one record, choosing the payload parser from the type field.
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let start = r.position();
        r.read_name()?;
        let rtype = r.read_u16()?;
        r.seek(start);

        match rtype {
            TYPE_A => parse_a(r),
            TYPE_PTR => parse_ptr(r),
            TYPE_SRV => parse_srv(r),
            other => Err(ProtocolError::UnsupportedRecordType(other)),
        }
    }
}

struct CommonFields {
    name: String,
    rtype: u16,
    record_class: u16,
    ttl_seconds: u32,
    rdlength: usize,
}

fn read_common(r: &mut ByteReader<'_>) -> Result<CommonFields, ProtocolError> {
    Ok(CommonFields {
        name: r.read_name()?,
        rtype: r.read_u16()?,
        record_class: r.read_u16()?,
        ttl_seconds: r.read_u32()?,
        rdlength: usize::from(r.read_u16()?),
    })
}

fn check_length(common: &CommonFields, start: usize, r: &ByteReader<'_>) -> Result<(), ProtocolError> {
    let actual = r.position() - start;
    if actual == common.rdlength {
        Ok(())
    } else {
        Err(ProtocolError::BadRecordLength {
            rtype: common.rtype,
            declared: common.rdlength,
            actual,
        })
    }
}

fn parse_a(r: &mut ByteReader<'_>) -> Result<ResourceRecord, ProtocolError> {
    let common = read_common(r)?;
    if common.rdlength != 4 {
        return Err(ProtocolError::BadRecordLength {
            rtype: TYPE_A,
            declared: common.rdlength,
            actual: 4,
        });
    }
    let octets = r.read_bytes(4)?;
    let ip_address = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    trace!(name = %common.name, %ip_address, "parsed A record");
    Ok(ResourceRecord {
        name: common.name,
        record_class: common.record_class,
        ttl_seconds: common.ttl_seconds,
        data: RecordData::A { ip_address },
    })
}

fn parse_ptr(r: &mut ByteReader<'_>) -> Result<ResourceRecord, ProtocolError> {
    let common = read_common(r)?;
    let start = r.position();
    let instance_name = r.read_name()?;
    check_length(&common, start, r)?;
    trace!(name = %common.name, %instance_name, "parsed PTR record");
    Ok(ResourceRecord {
        name: common.name,
        record_class: common.record_class,
        ttl_seconds: common.ttl_seconds,
        data: RecordData::Ptr { instance_name },
    })
}

fn parse_srv(r: &mut ByteReader<'_>) -> Result<ResourceRecord, ProtocolError> {
    let common = read_common(r)?;
    let start = r.position();
    let priority = r.read_u16()?;
    let weight = r.read_u16()?;
    let port = r.read_u16()?;
    let target_domain = r.read_name()?;
    check_length(&common, start, r)?;
    trace!(name = %common.name, %target_domain, port, "parsed SRV record");
    Ok(ResourceRecord::srv(
        common.name,
        priority,
        weight,
        port,
        target_domain,
        common.ttl_seconds,
    ))
}
