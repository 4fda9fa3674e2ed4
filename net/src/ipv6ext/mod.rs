// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv6 extension headers: hop-by-hop options, destination options, routing, mobility, HIPv2,
//! Shim6, and fragmentation.
//!
//! Hop-by-hop, destination-options, routing, mobility, HIPv2, and Shim6 share the same
//! length-in-8-byte-units framing (RFC 8200 §4.3) and so share one [`Parse`] impl
//! ([`ExtHeader`]). The fragment header (RFC 8200 §4.5) has a fixed 8-byte layout of its own
//! and gets its own type, [`FragmentHeader`].

use crate::ip::NextHeader;
use crate::ipv4::frag_offset::{FragOffset, IllegalFragOffset};
use crate::parse::{LengthError, Parse, ParseError};
use std::convert::Infallible;
use std::num::NonZero;

/// A hop-by-hop options, destination options, routing, mobility, HIPv2, or Shim6 header.
///
/// These all share the layout: 1 byte next-header, 1 byte "header extension length" (in units
/// of 8 bytes, not counting the first 8), then that many bytes of header-specific content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtHeader {
    next_header: NextHeader,
    total_len: usize,
}

impl ExtHeader {
    /// The next-header value carried by this extension header.
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        self.next_header
    }

    /// The total length of this extension header, in bytes (including the two leading bytes).
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total_len
    }
}

impl Parse for ExtHeader {
    type Error = Infallible;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < 2 {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(2).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let next_header = NextHeader::new(buf[0]);
        let hdr_ext_len = buf[1];
        let total_len = (usize::from(hdr_ext_len) + 1) * 8;
        if buf.len() < total_len {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(total_len).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        Ok((
            ExtHeader {
                next_header,
                total_len,
            },
            NonZero::new(total_len).unwrap_or_else(|| unreachable!()),
        ))
    }
}

/// The IPv6 fragment header (RFC 8200 §4.5), fixed at 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    next_header: NextHeader,
    fragment_offset: FragOffset,
    more_fragments: bool,
    identification: u32,
}

/// Errors produced while parsing a [`FragmentHeader`].
#[derive(Debug, thiserror::Error)]
pub enum FragmentHeaderError {
    /// The 13-bit fragment-offset field somehow overflowed (unreachable given the field width,
    /// kept so the error type stays total).
    #[error(transparent)]
    IllegalFragOffset(#[from] IllegalFragOffset),
}

impl FragmentHeader {
    /// Fixed length (in bytes) of the IPv6 fragment header.
    pub const LEN: usize = 8;

    /// The next-header value carried by this fragment header.
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        self.next_header
    }

    /// The 13-bit fragment offset, in units of 8 bytes.
    #[must_use]
    pub fn fragment_offset(&self) -> FragOffset {
        self.fragment_offset
    }

    /// Whether more fragments follow this one.
    #[must_use]
    pub fn more_fragments(&self) -> bool {
        self.more_fragments
    }

    /// The fragment identification, shared by every fragment of one original datagram.
    #[must_use]
    pub fn identification(&self) -> u32 {
        self.identification
    }

    /// True if this is the first fragment of a fragmented datagram (offset zero, MF set).
    #[must_use]
    pub fn is_first_fragment(&self) -> bool {
        self.more_fragments && self.fragment_offset.value() == 0
    }

    /// True if this is a non-initial fragment (nonzero offset).
    #[must_use]
    pub fn is_non_initial_fragment(&self) -> bool {
        self.fragment_offset.value() != 0
    }
}

impl Parse for FragmentHeader {
    type Error = FragmentHeaderError;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Self::LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Self::LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let next_header = NextHeader::new(buf[0]);
        let frag_word = u16::from_be_bytes([buf[2], buf[3]]);
        let fragment_offset = FragOffset::new(frag_word >> 3)
            .map_err(|e| ParseError::Invalid(FragmentHeaderError::IllegalFragOffset(e)))?;
        let more_fragments = frag_word & 0x1 != 0;
        let identification = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok((
            FragmentHeader {
                next_header,
                fragment_offset,
                more_fragments,
                identification,
            },
            NonZero::new(Self::LEN).unwrap_or_else(|| unreachable!()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ext_header_length_is_in_units_of_eight_bytes() {
        let mut buf = [0u8; 16];
        buf[0] = NextHeader::TCP.as_u8();
        buf[1] = 1; // (1+1)*8 = 16
        let (hdr, consumed) = ExtHeader::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 16);
        assert_eq!(hdr.total_len(), 16);
        assert_eq!(hdr.next_header(), NextHeader::TCP);
    }

    #[test]
    fn ext_header_short_buffer_fails_closed() {
        let buf = [0u8; 4];
        assert!(matches!(ExtHeader::parse(&buf), Err(ParseError::Length(_))));
    }

    #[test]
    fn fragment_header_decodes_first_fragment() {
        let mut buf = [0u8; FragmentHeader::LEN];
        buf[0] = NextHeader::TCP.as_u8();
        buf[2..4].copy_from_slice(&(0u16 << 3 | 1).to_be_bytes());
        buf[4..8].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        let (hdr, consumed) = FragmentHeader::parse(&buf).unwrap();
        assert_eq!(consumed.get(), FragmentHeader::LEN);
        assert!(hdr.is_first_fragment());
        assert!(!hdr.is_non_initial_fragment());
        assert_eq!(hdr.identification(), 0xdead_beef);
    }

    #[test]
    fn fragment_header_decodes_non_initial_fragment() {
        let mut buf = [0u8; FragmentHeader::LEN];
        buf[0] = NextHeader::TCP.as_u8();
        buf[2..4].copy_from_slice(&(40u16 << 3).to_be_bytes());
        let (hdr, _) = FragmentHeader::parse(&buf).unwrap();
        assert!(!hdr.is_first_fragment());
        assert!(hdr.is_non_initial_fragment());
        assert_eq!(hdr.fragment_offset().value(), 40);
    }
}
