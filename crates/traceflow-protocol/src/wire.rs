// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Positional binary codec.
//!
//! Values are written at a cursor into a fixed-capacity scratch buffer and
//! read back at a cursor in the same declared order. Encode and decode are
//! mutual inverses for every shape below:
//!
//! | shape | encoding |
//! |-------|----------|
//! | `i32` | 4 bytes, little-endian |
//! | `bool` | 1 byte (0 or 1) |
//! | timestamp | `i64` Unix milliseconds, 8 bytes, little-endian |
//! | string | `i32` byte length + UTF-8 bytes |
//! | map | `i32` pair count + (key string, value string) pairs |
//! | `i32` list | `i32` count + elements |
//! | record | fields in declared order, recursively |
//! | record list | `i32` count + records |
//!
//! All integers are little-endian. The writer refuses to grow past its
//! capacity; [`WireWriter::finish`] returns exactly the bytes written.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Scratch buffer capacity for a single message.
///
/// Generously sized so that field writes never straddle the capacity in
/// normal operation; a message that would exceed it is refused, not split.
pub const BUFFER_SIZE: usize = 2048;

/// Errors raised by the codec and the command envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A write would exceed the buffer capacity.
    #[error("buffer overflow: {needed} bytes needed at offset {offset} (capacity {capacity})")]
    BufferOverflow {
        /// Cursor position at the time of the write.
        offset: usize,
        /// Bytes the write required.
        needed: usize,
        /// Total buffer capacity.
        capacity: usize,
    },

    /// A read ran past the end of the message.
    #[error("message truncated: {needed} bytes needed at offset {offset} (message length {len})")]
    Truncated {
        /// Cursor position at the time of the read.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Total message length.
        len: usize,
    },

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field at offset {0}")]
    InvalidUtf8(usize),

    /// A length prefix was negative.
    #[error("negative length prefix {0} at offset {1}")]
    NegativeLength(i32, usize),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),

    /// A timestamp field was out of the representable range.
    #[error("timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),

    /// The leading command id is not a known command.
    #[error("unknown command id: {0}")]
    UnknownCommandId(i32),

    /// An enum-coded field carried a value outside its defined set.
    #[error("unknown outcome code: {0}")]
    UnknownOutcome(i32),

    /// The leading command id does not match the expected command.
    #[error("command id mismatch: expected {expected}, got {actual}")]
    CommandMismatch {
        /// The id the caller expected.
        expected: i32,
        /// The id actually present on the wire.
        actual: i32,
    },
}

/// A value that can be appended to a [`WireWriter`].
pub trait WireEncode {
    /// Append this value's fields in declared order.
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError>;
}

/// A value that can be read from a [`WireReader`].
pub trait WireDecode: Sized {
    /// Read this value's fields in declared order.
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError>;
}

/// Cursor-based writer over a fixed-capacity scratch buffer.
pub struct WireWriter {
    buf: BytesMut,
    capacity: usize,
}

impl WireWriter {
    /// Create a writer with the default [`BUFFER_SIZE`] capacity.
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_SIZE)
    }

    /// Create a writer with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&mut self, needed: usize) -> Result<(), WireError> {
        if self.buf.len() + needed > self.capacity {
            return Err(WireError::BufferOverflow {
                offset: self.buf.len(),
                needed,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Append a 32-bit integer.
    pub fn put_i32(&mut self, value: i32) -> Result<(), WireError> {
        self.ensure(4)?;
        self.buf.put_i32_le(value);
        Ok(())
    }

    /// Append a boolean as one byte.
    pub fn put_bool(&mut self, value: bool) -> Result<(), WireError> {
        self.ensure(1)?;
        self.buf.put_u8(u8::from(value));
        Ok(())
    }

    /// Append a timestamp as Unix milliseconds.
    pub fn put_timestamp(&mut self, value: DateTime<Utc>) -> Result<(), WireError> {
        self.ensure(8)?;
        self.buf.put_i64_le(value.timestamp_millis());
        Ok(())
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, value: &str) -> Result<(), WireError> {
        let bytes = value.as_bytes();
        self.put_i32(bytes.len() as i32)?;
        self.ensure(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Append a string-to-string map as a count-prefixed pair sequence.
    ///
    /// `BTreeMap` keeps key order deterministic across encodes.
    pub fn put_map(&mut self, value: &BTreeMap<String, String>) -> Result<(), WireError> {
        self.put_i32(value.len() as i32)?;
        for (k, v) in value {
            self.put_str(k)?;
            self.put_str(v)?;
        }
        Ok(())
    }

    /// Append a count-prefixed list of 32-bit integers.
    pub fn put_i32_list(&mut self, value: &[i32]) -> Result<(), WireError> {
        self.put_i32(value.len() as i32)?;
        for v in value {
            self.put_i32(*v)?;
        }
        Ok(())
    }

    /// Append a count-prefixed list of records.
    pub fn put_list<T: WireEncode>(&mut self, value: &[T]) -> Result<(), WireError> {
        self.put_i32(value.len() as i32)?;
        for item in value {
            item.encode(self)?;
        }
        Ok(())
    }

    /// Finish writing and return exactly the bytes written.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor-based reader over a received message.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader over a complete message.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < needed {
            return Err(WireError::Truncated {
                offset: self.pos,
                needed,
                len: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    /// Read a 32-bit integer.
    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a boolean byte.
    pub fn get_bool(&mut self) -> Result<bool, WireError> {
        let byte = self.take(1)?[0];
        match byte {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }

    /// Read a Unix-millisecond timestamp.
    pub fn get_timestamp(&mut self) -> Result<DateTime<Utc>, WireError> {
        let bytes = self.take(8)?;
        let millis = i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or(WireError::InvalidTimestamp(millis))
    }

    /// Read a count prefix, rejecting negative values.
    fn get_count(&mut self) -> Result<usize, WireError> {
        let offset = self.pos;
        let count = self.get_i32()?;
        if count < 0 {
            return Err(WireError::NegativeLength(count, offset));
        }
        Ok(count as usize)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<String, WireError> {
        let len = self.get_count()?;
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8(offset))
    }

    /// Read a string-to-string map.
    pub fn get_map(&mut self) -> Result<BTreeMap<String, String>, WireError> {
        let count = self.get_count()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.get_str()?;
            let value = self.get_str()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Read a count-prefixed list of 32-bit integers.
    pub fn get_i32_list(&mut self) -> Result<Vec<i32>, WireError> {
        let count = self.get_count()?;
        let mut list = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            list.push(self.get_i32()?);
        }
        Ok(list)
    }

    /// Read a count-prefixed list of records.
    pub fn get_list<T: WireDecode>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.get_count()?;
        let mut list = Vec::new();
        for _ in 0..count {
            list.push(T::decode(self)?);
        }
        Ok(list)
    }
}
