//! Wire codec: big-endian integers, byte spans and DNS names.
//!
//! Names are written as a sequence of length-prefixed labels terminated by a
//! zero byte. The writer never emits compression pointers; the reader follows
//! them (RFC 1035 §4.1.4) as long as every jump goes strictly backwards.

use crate::error::ProtocolError;

/// Longest label allowed by RFC 1035.
pub const MAX_LABEL_LEN: usize = 63;

/// Longest name allowed by RFC 1035, counting length bytes and the root.
pub const MAX_NAME_LEN: usize = 255;

const POINTER_MASK: u8 = 0xC0;

/// Append-only buffer for building a message.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append the low `width` bytes of `value`, most significant first.
    ///
    /// Bits above `width * 8` are dropped. `width` is clamped to `1..=4`.
    pub fn put_uint(&mut self, value: u32, width: usize) {
        let width = width.clamp(1, 4);
        for shift in (0..width).rev() {
            #[allow(clippy::cast_possible_truncation)]
            self.buf.push((value >> (shift * 8)) as u8);
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite two bytes already written at `at`.
    pub fn patch_u16(&mut self, at: usize, value: u16) {
        if let Some(slot) = self.buf.get_mut(at..at + 2) {
            slot.copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Append a single-byte length prefix followed by the UTF-8 bytes of `s`.
    pub fn put_character_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        let len = u8::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong(s.len()))?;
        self.buf.push(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Append `name` in uncompressed label encoding.
    pub fn put_name(&mut self, name: &str) -> Result<(), ProtocolError> {
        for label in split_labels(name)? {
            // split_labels guarantees the length fits in six bits
            #[allow(clippy::cast_possible_truncation)]
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label.as_bytes());
        }
        self.buf.push(0);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Split a dotted name into labels, validating each one.
///
/// A single trailing dot (fully-qualified form) is accepted and ignored; the
/// empty name and `"."` both mean the root. The encoded form must fit in
/// [`MAX_NAME_LEN`] bytes.
pub fn split_labels(name: &str) -> Result<Vec<&str>, ProtocolError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let labels = trimmed
        .split('.')
        .map(|label| {
            if label.is_empty() {
                Err(ProtocolError::EmptyLabel(name.to_string()))
            } else if label.len() > MAX_LABEL_LEN {
                Err(ProtocolError::LabelTooLong(label.len()))
            } else {
                Ok(label)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let encoded = encoded_len(&labels);
    if encoded > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong(encoded));
    }
    Ok(labels)
}

fn encoded_len(labels: &[&str]) -> usize {
    labels.iter().map(|label| label.len() + 1).sum::<usize>() + 1
}

/// Cursor over an immutable datagram.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor, clamped to the end of the buffer.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes.
    ///
    /// Returns an empty slice, without moving the cursor, when fewer than `n`
    /// bytes are left.
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        if self.remaining() < n {
            return &[];
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    /// Like [`take`](Self::take) but a short read is an error.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let offset = self.pos;
        let bytes = self.take(n);
        if bytes.len() == n {
            Ok(bytes)
        } else {
            Err(ProtocolError::UnexpectedEnd { offset, wanted: n })
        }
    }

    /// Read a big-endian unsigned integer of `width` (1..=4) bytes.
    pub fn read_uint(&mut self, width: usize) -> Result<u32, ProtocolError> {
        let width = width.clamp(1, 4);
        let bytes = self.read_bytes(width)?;
        Ok(bytes
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_character_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u8()?;
        let bytes = self.read_bytes(usize::from(len))?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Read a name, following compression pointers.
    ///
    /// The cursor ends up just past the name as it appears at the current
    /// position, i.e. after the first pointer if there is one.
    pub fn read_name(&mut self) -> Result<String, ProtocolError> {
        let data = self.data;
        let mut labels: Vec<&str> = Vec::new();
        let mut offset = self.pos;
        let mut lowest = offset;
        let mut resume = None;

        loop {
            let len = *data
                .get(offset)
                .ok_or(ProtocolError::UnexpectedEnd { offset, wanted: 1 })?;

            match len & POINTER_MASK {
                0x00 if len == 0 => {
                    offset += 1;
                    break;
                }
                0x00 => {
                    let start = offset + 1;
                    let end = start + usize::from(len);
                    let bytes = data.get(start..end).ok_or(ProtocolError::UnexpectedEnd {
                        offset: start,
                        wanted: usize::from(len),
                    })?;
                    labels.push(std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?);
                    let encoded = encoded_len(&labels);
                    if encoded > MAX_NAME_LEN {
                        return Err(ProtocolError::NameTooLong(encoded));
                    }
                    offset = end;
                }
                POINTER_MASK => {
                    let low = *data
                        .get(offset + 1)
                        .ok_or(ProtocolError::UnexpectedEnd {
                            offset: offset + 1,
                            wanted: 1,
                        })?;
                    let pointer = u16::from_be_bytes([len, low]);
                    let target = usize::from(pointer & 0x3FFF);
                    if target >= lowest {
                        return Err(ProtocolError::BadPointer { pointer, offset });
                    }
                    if resume.is_none() {
                        resume = Some(offset + 2);
                    }
                    lowest = target;
                    offset = target;
                }
                reserved => return Err(ProtocolError::ReservedLabelType(reserved)),
            }
        }

        self.pos = resume.unwrap_or(offset);
        Ok(labels.join("."))
    }
}
