//! Cursor over a metadata blob.
//!
//! [`Parser`] owns a position into a borrowed byte slice and offers bounds-checked reads of
//! the primitive and compressed encodings used by ECMA-335 signatures, custom attribute blobs
//! and portable PDB sequence-point records. Every read either advances the cursor past the
//! consumed bytes or fails with [`crate::Error::OutOfBounds`] / [`crate::Error::Malformed`];
//! no raw pointer arithmetic leaks across the API.
//!
//! # Compressed integers
//!
//! | First byte   | Width   | Range                  |
//! |--------------|---------|------------------------|
//! | `0xxxxxxx`   | 1 byte  | `0x00..=0x7F`          |
//! | `10xxxxxx`   | 2 bytes | `0x80..=0x3FFF`        |
//! | `110xxxxx`   | 4 bytes | `0x4000..=0x1FFF_FFFF` |
//!
//! Each form is big-endian within its own width, with the length marker stripped from the
//! first byte.
//!
//! # Examples
//!
//! ```rust
//! use corscope::blob::Parser;
//!
//! let blob = [0x03, 0x80, 0x80, 0x49];
//! let mut parser = Parser::new(&blob);
//! assert_eq!(parser.read_compressed_uint()?, 3);
//! assert_eq!(parser.read_compressed_uint()?, 0x80);
//! assert_eq!(parser.read_compressed_token()?.value(), 0x0100_0012);
//! # Ok::<(), corscope::Error>(())
//! ```

use crate::{
    blob::io::{read_le_at, BlobIO},
    metadata::token::Token,
    Result,
};

/// Table selectors of a compressed `TypeDefOrRefOrSpec` token, indexed by the low two bits.
const TOKEN_TABLES: [u32; 4] = [
    Token::TYPE_DEF,
    Token::TYPE_REF,
    Token::TYPE_SPEC,
    Token::BASE_TYPE,
];

/// A bounds-checked cursor over a byte slice.
///
/// The parser never copies its input; reads return owned primitives or borrow from the
/// underlying slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if at least one unread byte remains.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Current cursor position, which is also the number of bytes consumed so far.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to `len()` is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip a single byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the parser is exhausted.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the parser is exhausted.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// Run `f` and rewind the cursor if it fails.
    ///
    /// # Errors
    /// Propagates the error returned by `f`.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit in the remaining data.
    pub fn read_le<T: BlobIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `count` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `count` bytes remain.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read an ECMA-335 compressed unsigned integer (II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or
    /// [`crate::Error::Malformed`] if the first byte carries the reserved `111xxxxx` marker.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!(
            "Invalid compressed uint - 0x{:02X}",
            first_byte
        ))
    }

    /// Read an ECMA-335 compressed signed integer.
    ///
    /// The value is rotated so that the sign lives in the least significant bit.
    ///
    /// # Errors
    /// See [`Parser::read_compressed_uint`].
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;

        #[allow(clippy::cast_possible_wrap)]
        let magnitude = (unsigned >> 1) as i32;
        if (unsigned & 1) == 0 {
            return Ok(magnitude);
        }

        // Negative values are stored in two's complement of the encoded width
        let bias = match self.position - start {
            1 => 0x40,
            2 => 0x2000,
            _ => 0x1000_0000,
        };
        Ok(magnitude - bias)
    }

    /// Read a compressed `TypeDefOrRefOrSpec` token.
    ///
    /// The low two bits select the table (TypeDef, TypeRef, TypeSpec, BaseType), the remaining
    /// bits carry the row id.
    ///
    /// # Errors
    /// See [`Parser::read_compressed_uint`].
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;
        let table = TOKEN_TABLES[(compressed_token & 0x3) as usize];

        Ok(Token::new(table | (compressed_token >> 2)))
    }

    /// Read a `SerString` from a custom attribute blob.
    ///
    /// A leading `0xFF` encodes a null string and yields `None`; otherwise a compressed length
    /// is followed by that many UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or
    /// [`crate::Error::Malformed`] if the payload is not valid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.advance()?;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;

        std::str::from_utf8(bytes)
            .map(|value| Some(value.to_string()))
            .map_err(|e| malformed_error!("Invalid UTF-8 string at offset {}: {}", start, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn compressed_uint_widths() {
        let cases: &[(&[u8], u32)] = &[
            (&[0x00], 0),
            (&[0x03], 0x03),
            (&[0x7F], 0x7F),
            (&[0x80, 0x80], 0x80),
            (&[0xAE, 0x57], 0x2E57),
            (&[0xBF, 0xFF], 0x3FFF),
            (&[0xC0, 0x00, 0x40, 0x00], 0x4000),
            (&[0xDF, 0xFF, 0xFF, 0xFF], 0x1FFF_FFFF),
        ];

        for (bytes, expected) in cases {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_uint().unwrap(), *expected);
            assert_eq!(parser.pos(), bytes.len());
        }
    }

    #[test]
    fn compressed_uint_rejects_reserved_marker() {
        let mut parser = Parser::new(&[0xE0, 0x00, 0x00, 0x00]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn compressed_uint_truncated() {
        let mut parser = Parser::new(&[0xC0, 0x00]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn compressed_int_signs() {
        let mut parser = Parser::new(&[0x06, 0x7B, 0x80, 0x80, 0x01, 0x7F, 0xBF, 0xFF, 0xC0, 0x00, 0x00, 0x01]);
        assert_eq!(parser.read_compressed_int().unwrap(), 3);
        assert_eq!(parser.read_compressed_int().unwrap(), -3);
        assert_eq!(parser.read_compressed_int().unwrap(), 64);
        assert_eq!(parser.read_compressed_int().unwrap(), -64);
        assert_eq!(parser.read_compressed_int().unwrap(), -1);
        assert_eq!(parser.read_compressed_int().unwrap(), -1);
        assert_eq!(parser.read_compressed_int().unwrap(), -0x1000_0000);
    }

    #[test]
    fn compressed_token_tables() {
        let mut parser = Parser::new(&[0x49, 0x0C, 0x12, 0x07]);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0100_0012);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0200_0003);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x1B00_0004);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x7200_0001);
    }

    #[test]
    fn ser_string_null_and_value() {
        let mut parser = Parser::new(&[0xFF, 0x03, b'a', b'b', b'c']);
        assert_eq!(parser.read_ser_string().unwrap(), None);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("abc"));
        assert!(!parser.has_more_data());
    }

    #[test]
    fn transactional_rewinds_on_error() {
        let mut parser = Parser::new(&[0x01, 0x02]);
        let result: Result<u32> = parser.transactional(|p| {
            p.advance()?;
            p.read_le::<u32>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn seek_and_read_bytes() {
        let data = [0x10, 0x20, 0x30, 0x40];
        let mut parser = Parser::new(&data);
        parser.seek(2).unwrap();
        assert_eq!(parser.read_bytes(2).unwrap(), &[0x30, 0x40]);
        assert!(parser.seek(4).is_ok());
        assert!(parser.seek(5).is_err());
        assert!(parser.read_bytes(1).is_err());
    }
}
