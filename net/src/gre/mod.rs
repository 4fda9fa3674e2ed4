// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Generic Routing Encapsulation (RFC 2784 / RFC 2890) header, to the extent needed to skip
//! past it to the inner Ethernet-type payload.

use crate::eth::ethtype::EthType;
use crate::parse::{LengthError, Parse, ParseError};
use std::convert::Infallible;
use std::num::NonZero;

const FLAG_CSUM: u16 = 0x8000;
const FLAG_ROUTING: u16 = 0x4000;
const FLAG_KEY: u16 = 0x2000;
const FLAG_SEQ: u16 = 0x1000;

/// A GRE header, trimmed down to its flags and the EtherType of its encapsulated payload.
///
/// The optional checksum+routing (4 bytes), key (4 bytes), and sequence-number (4 bytes) fields
/// are skipped over based on the flag bits rather than exposed, since the flow manager only needs
/// to walk past them to the payload beneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gre {
    protocol: EthType,
}

impl Gre {
    /// Minimum length of a GRE header (flags + protocol, no optional fields).
    pub const MIN_LEN: usize = 4;

    /// The EtherType of the header's payload (e.g. IPv4, IPv6).
    #[must_use]
    pub fn protocol(&self) -> EthType {
        self.protocol
    }
}

impl Parse for Gre {
    type Error = Infallible;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Self::MIN_LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Self::MIN_LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let flags = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol = EthType::new(u16::from_be_bytes([buf[2], buf[3]]));

        let mut total_len = Self::MIN_LEN;
        if flags & (FLAG_CSUM | FLAG_ROUTING) != 0 {
            total_len += 4; // checksum + reserved1
        }
        if flags & FLAG_KEY != 0 {
            total_len += 4;
        }
        if flags & FLAG_SEQ != 0 {
            total_len += 4;
        }
        if buf.len() < total_len {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(total_len).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        Ok((
            Gre { protocol },
            NonZero::new(total_len).unwrap_or_else(|| unreachable!()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_header_with_no_optional_fields() {
        let mut buf = [0u8; 4];
        buf[2..4].copy_from_slice(&0x0800u16.to_be_bytes());
        let (gre, consumed) = Gre::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 4);
        assert_eq!(gre.protocol(), EthType::IPV4);
    }

    #[test]
    fn checksum_and_key_and_seq_flags_extend_header() {
        let mut buf = [0u8; 16];
        let flags = FLAG_CSUM | FLAG_KEY | FLAG_SEQ;
        buf[0..2].copy_from_slice(&flags.to_be_bytes());
        buf[2..4].copy_from_slice(&0x86DDu16.to_be_bytes());
        let (gre, consumed) = Gre::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 16);
        assert_eq!(gre.protocol(), EthType::IPV6);
    }

    #[test]
    fn routing_flag_alone_extends_header() {
        let mut buf = [0u8; 8];
        buf[0..2].copy_from_slice(&FLAG_ROUTING.to_be_bytes());
        buf[2..4].copy_from_slice(&0x0800u16.to_be_bytes());
        let (gre, consumed) = Gre::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 8);
        assert_eq!(gre.protocol(), EthType::IPV4);
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; 3];
        assert!(matches!(Gre::parse(&buf), Err(ParseError::Length(_))));
    }
}
