// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounds-checked cursor and traits used to parse packet headers.

use std::num::NonZero;

/// A type which can be parsed from the front of a byte slice.
pub trait Parse: Sized {
    /// Error produced when the bytes do not encode a legal value of `Self`.
    type Error: core::error::Error;

    /// Parse a `Self` from the front of `buf`, returning the value and the number of bytes
    /// consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` is too short or the header is otherwise invalid.
    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>>;
}

/// A type which can be parsed given an out-of-band parameter (e.g. the next-header value that
/// selects which variant of an extension header chain to build).
pub trait ParseWith {
    /// Error produced when the bytes do not encode a legal value of `Self`.
    type Error: core::error::Error;
    /// The out-of-band parameter needed to disambiguate parsing.
    type Param;

    /// # Errors
    ///
    /// Returns an error if `raw` is too short or the header is otherwise invalid.
    fn parse_with(
        param: Self::Param,
        raw: &[u8],
    ) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>>
    where
        Self: Sized;
}

/// Error produced when a length-prefixed buffer is shorter than required.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("expected at least {expected} bytes, got {actual}")]
pub struct LengthError {
    /// Minimum number of bytes required.
    pub expected: NonZero<usize>,
    /// Number of bytes actually available.
    pub actual: usize,
}

/// A forward-only, bounds-checked cursor over a byte slice.
///
/// Every parse through the cursor is checked against the number of bytes remaining; a short
/// buffer anywhere in the chain produces a [`LengthError`] rather than a panic or an
/// out-of-bounds read.
#[derive(Debug)]
pub struct Reader<'buf> {
    inner: &'buf [u8],
    remaining: usize,
}

impl<'buf> Reader<'buf> {
    /// Build a cursor over the whole of `buf`.
    #[must_use]
    pub fn new(buf: &'buf [u8]) -> Reader<'buf> {
        Reader {
            inner: buf,
            remaining: buf.len(),
        }
    }

    /// Number of bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The unconsumed tail of the buffer.
    #[must_use]
    pub fn rest(&self) -> &'buf [u8] {
        let start = self.inner.len() - self.remaining;
        &self.inner[start..]
    }

    /// Offset (from the start of the original buffer) of the first unconsumed byte.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.inner.len() - self.remaining
    }

    fn consume(&mut self, n: usize) -> Result<(), LengthError> {
        if n > self.remaining {
            return Err(LengthError {
                expected: NonZero::new(n).unwrap_or_else(|| unreachable!()),
                actual: self.remaining,
            });
        }
        self.remaining -= n;
        Ok(())
    }

    /// Parse a `T` from the front of the remaining buffer, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Propagates any error `T::parse` returns.
    pub fn parse<T: Parse>(&mut self) -> Result<(T, NonZero<usize>), ParseError<T::Error>> {
        let (value, consumed) = T::parse(self.rest())?;
        self.consume(consumed.get()).map_err(ParseError::Length)?;
        Ok((value, consumed))
    }

    /// Parse a `T` given a parameter, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Propagates any error `T::parse_with` returns.
    pub fn parse_with<T: ParseWith>(
        &mut self,
        param: T::Param,
    ) -> Result<(T, NonZero<usize>), ParseError<T::Error>> {
        let (value, consumed) = T::parse_with(param, self.rest())?;
        self.consume(consumed.get()).map_err(ParseError::Length)?;
        Ok((value, consumed))
    }

    /// Skip forward by exactly `n` bytes without interpreting them.
    ///
    /// # Errors
    ///
    /// Returns a [`LengthError`] if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<(), LengthError> {
        self.consume(n)
    }

    /// Read a single byte and advance the cursor.
    ///
    /// # Errors
    ///
    /// Returns a [`LengthError`] if the buffer is empty.
    pub fn take_u8(&mut self) -> Result<u8, LengthError> {
        let byte = *self.rest().first().ok_or(LengthError {
            expected: NonZero::new(1).unwrap_or_else(|| unreachable!()),
            actual: self.remaining,
        })?;
        self.consume(1)?;
        Ok(byte)
    }

    /// Read a big-endian `u16` and advance the cursor.
    ///
    /// # Errors
    ///
    /// Returns a [`LengthError`] if fewer than two bytes remain.
    pub fn take_u16_be(&mut self) -> Result<u16, LengthError> {
        let rest = self.rest();
        if rest.len() < 2 {
            return Err(LengthError {
                expected: NonZero::new(2).unwrap_or_else(|| unreachable!()),
                actual: self.remaining,
            });
        }
        let value = u16::from_be_bytes([rest[0], rest[1]]);
        self.consume(2)?;
        Ok(value)
    }

    /// Read a big-endian `u32` and advance the cursor.
    ///
    /// # Errors
    ///
    /// Returns a [`LengthError`] if fewer than four bytes remain.
    pub fn take_u32_be(&mut self) -> Result<u32, LengthError> {
        let rest = self.rest();
        if rest.len() < 4 {
            return Err(LengthError {
                expected: NonZero::new(4).unwrap_or_else(|| unreachable!()),
                actual: self.remaining,
            });
        }
        let value = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        self.consume(4)?;
        Ok(value)
    }
}

/// Error produced while parsing a header.
#[derive(thiserror::Error, Debug)]
pub enum ParseError<E: core::error::Error> {
    /// The buffer was too short.
    #[error(transparent)]
    Length(LengthError),
    /// The bytes present do not encode a legal header.
    #[error(transparent)]
    Invalid(E),
}

/// A type which can serialize itself back to wire bytes.
///
/// Used by round-trip tests to check that `parse` and `deparse` agree; the flow manager's
/// decoder itself never re-serializes a packet.
pub trait DeParse: Sized {
    /// Error produced when `self` cannot be written out (e.g. the buffer is too short).
    type Error: core::error::Error;

    /// The number of bytes `deparse` will write.
    fn size(&self) -> NonZero<usize>;

    /// Write `self` to the front of `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` is shorter than [`DeParse::size`].
    fn deparse(&self, buf: &mut [u8]) -> Result<NonZero<usize>, DeParseError<Self::Error>>;
}

/// Error produced while serializing a header.
#[derive(thiserror::Error, Debug)]
pub enum DeParseError<E: core::error::Error> {
    /// The output buffer was too short.
    #[error(transparent)]
    Length(LengthError),
    /// `self` could not be represented on the wire.
    #[error(transparent)]
    Invalid(E),
}

/// Convenience conversion from a [`NonZero<usize>`] byte count, matching the teacher's idiom of
/// keeping buffer-length math in one place.
pub trait IntoNonZeroUsize {
    /// Return `self` as a plain `usize`.
    fn into_non_zero_usize(self) -> NonZero<usize>;
}

impl IntoNonZeroUsize for NonZero<usize> {
    fn into_non_zero_usize(self) -> NonZero<usize> {
        self
    }
}
