//! Header flag word.
//!
//! Bit layout, most significant first:
//!
//! ```text
//! QR(1) OPCODE(4) AA(1) TC(1) RD(1) RA(1) RESERVED(3) RCODE(4)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A 4-bit unsigned value (OPCODE, RCODE).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Nibble(u8);

impl Nibble {
    pub const ZERO: Nibble = Nibble(0);

    /// Reject anything above 15.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > 0x0F {
            return Err(ValidationError {
                field: "nibble",
                value: u32::from(value),
                bits: 4,
            });
        }
        Ok(Self(value))
    }

    fn named(field: &'static str, value: u8) -> Result<Self, ValidationError> {
        Self::new(value).map_err(|e| ValidationError { field, ..e })
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Nibble {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Nibble> for u8 {
    fn from(n: Nibble) -> Self {
        n.0
    }
}

/// Decoded header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// `QR == 0`.
    pub is_query: bool,
    pub op_code: Nibble,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub return_code: Nibble,
}

const QR: u16 = 0x8000;
const AA: u16 = 0x0400;
const TC: u16 = 0x0200;
const RD: u16 = 0x0100;
const RA: u16 = 0x0080;

impl Flags {
    /// Flags for an outgoing mDNS query: everything zero.
    pub const QUERY: Flags = Flags {
        is_query: true,
        op_code: Nibble::ZERO,
        is_authoritative: false,
        is_truncated: false,
        recursion_desired: false,
        recursion_available: false,
        return_code: Nibble::ZERO,
    };

    /// Flags for an mDNS response: QR and AA set, everything else zero.
    pub const RESPONSE: Flags = Flags {
        is_query: false,
        op_code: Nibble::ZERO,
        is_authoritative: true,
        is_truncated: false,
        recursion_desired: false,
        recursion_available: false,
        return_code: Nibble::ZERO,
    };

    /// Build flags from raw field values, validating the 4-bit fields.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn new(
        is_query: bool,
        op_code: u8,
        is_authoritative: bool,
        is_truncated: bool,
        recursion_desired: bool,
        recursion_available: bool,
        return_code: u8,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            is_query,
            op_code: Nibble::named("opcode", op_code)?,
            is_authoritative,
            is_truncated,
            recursion_desired,
            recursion_available,
            return_code: Nibble::named("rcode", return_code)?,
        })
    }

    /// Pack into the 16-bit header word. Reserved bits are written as zero.
    pub fn to_u16(self) -> u16 {
        let mut word = 0u16;
        if !self.is_query {
            word |= QR;
        }
        word |= u16::from(self.op_code.get()) << 11;
        if self.is_authoritative {
            word |= AA;
        }
        if self.is_truncated {
            word |= TC;
        }
        if self.recursion_desired {
            word |= RD;
        }
        if self.recursion_available {
            word |= RA;
        }
        word | u16::from(self.return_code.get())
    }

    /// Unpack a header word. Reserved bits are ignored.
    pub fn from_u16(word: u16) -> Self {
        // both fields are masked to four bits
        #[allow(clippy::cast_possible_truncation)]
        let op_code = Nibble(((word >> 11) & 0x0F) as u8);
        #[allow(clippy::cast_possible_truncation)]
        let return_code = Nibble((word & 0x0F) as u8);
        Self {
            is_query: word & QR == 0,
            op_code,
            is_authoritative: word & AA != 0,
            is_truncated: word & TC != 0,
            recursion_desired: word & RD != 0,
            recursion_available: word & RA != 0,
            return_code,
        }
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::QUERY
    }
}
