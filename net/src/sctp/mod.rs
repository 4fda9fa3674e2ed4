// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SCTP common header, to the extent needed to extract source/destination ports.

use crate::parse::{LengthError, Parse, ParseError};
use std::num::NonZero;

/// The fixed 12-byte SCTP common header (RFC 9260 §3.1): source port, destination port,
/// verification tag, checksum. Chunk data beyond the common header is not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sctp {
    source: u16,
    destination: u16,
}

/// Errors produced while parsing an [`Sctp`] common header.
#[derive(Debug, thiserror::Error)]
pub enum SctpError {}

impl Sctp {
    /// Length (in bytes) of the SCTP common header.
    pub const LEN: usize = 12;

    /// The source port. Zero is legal here (reserved by convention, but not rejected on the
    /// wire).
    #[must_use]
    pub fn source(&self) -> u16 {
        self.source
    }

    /// The destination port. Zero is legal here (reserved by convention, but not rejected on
    /// the wire).
    #[must_use]
    pub fn destination(&self) -> u16 {
        self.destination
    }
}

impl Parse for Sctp {
    type Error = SctpError;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Self::LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Self::LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let source = u16::from_be_bytes([buf[0], buf[1]]);
        let destination = u16::from_be_bytes([buf[2], buf[3]]);
        Ok((
            Sctp {
                source,
                destination,
            },
            NonZero::new(Self::LEN).unwrap_or_else(|| unreachable!()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> [u8; Sctp::LEN] {
        let mut buf = [0u8; Sctp::LEN];
        buf[0..2].copy_from_slice(&1000u16.to_be_bytes());
        buf[2..4].copy_from_slice(&2000u16.to_be_bytes());
        buf
    }

    #[test]
    fn parses_source_and_destination_ports() {
        let buf = sample();
        let (sctp, consumed) = Sctp::parse(&buf).unwrap();
        assert_eq!(consumed.get(), Sctp::LEN);
        assert_eq!(sctp.source(), 1000);
        assert_eq!(sctp.destination(), 2000);
    }

    #[test]
    fn zero_source_port_is_decoded_not_rejected() {
        let mut buf = sample();
        buf[0..2].copy_from_slice(&0u16.to_be_bytes());
        let (sctp, _) = Sctp::parse(&buf).unwrap();
        assert_eq!(sctp.source(), 0);
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; Sctp::LEN - 1];
        assert!(matches!(Sctp::parse(&buf), Err(ParseError::Length(_))));
    }
}
