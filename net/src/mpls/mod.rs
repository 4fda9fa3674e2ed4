// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! MPLS label stack entry type and parsing.

use crate::parse::{LengthError, Parse, ParseError};
use std::convert::Infallible;
use std::num::NonZero;

/// A single MPLS label stack entry (RFC 3032): a 20-bit label, 3-bit traffic class, a
/// bottom-of-stack bit, and an 8-bit TTL, packed into 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mpls(u32);

impl Mpls {
    /// The length (in bytes) of one MPLS label stack entry.
    pub const HEADER_LEN: usize = 4;

    /// The 20-bit label value.
    #[must_use]
    pub fn label(&self) -> u32 {
        self.0 >> 12
    }

    /// True if this is the last label in the stack (bottom-of-stack bit set).
    #[must_use]
    pub fn bottom_of_stack(&self) -> bool {
        self.0 & 0x100 != 0
    }

    /// The 8-bit time-to-live field.
    #[must_use]
    pub fn ttl(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl Parse for Mpls {
    type Error = Infallible;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Self::HEADER_LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Self::HEADER_LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let word = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Ok((
            Mpls(word),
            NonZero::new(Self::HEADER_LEN).unwrap_or_else(|| unreachable!()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_label_bos_and_ttl() {
        // label=100, exp=0, bos=1, ttl=64
        let label: u32 = 100;
        let word = (label << 12) | 0x100 | 64;
        let buf = word.to_be_bytes();
        let (mpls, consumed) = Mpls::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 4);
        assert_eq!(mpls.label(), 100);
        assert!(mpls.bottom_of_stack());
        assert_eq!(mpls.ttl(), 64);
    }

    #[test]
    fn non_bottom_label_is_detected() {
        let word: u32 = (200 << 12) | 32;
        let buf = word.to_be_bytes();
        let (mpls, _) = Mpls::parse(&buf).unwrap();
        assert!(!mpls.bottom_of_stack());
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; 3];
        assert!(matches!(Mpls::parse(&buf), Err(ParseError::Length(_))));
    }
}
