// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! UDP header type and logic.

pub mod port;

use crate::parse::{DeParse, DeParseError, IntoNonZeroUsize, LengthError, Parse, ParseError};
use crate::udp::port::UdpPort;
use etherparse::UdpHeader;
use std::num::NonZero;

/// A UDP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Udp(UdpHeader);

impl Udp {
    /// The minimum (and maximum) length of a UDP header.
    pub const LEN: usize = 8;

    /// Build a UDP header with the given ports, for use in tests and fixtures.
    #[must_use]
    pub fn new(source: UdpPort, destination: UdpPort) -> Udp {
        Udp(UdpHeader {
            source_port: source.into(),
            destination_port: destination.into(),
            length: Self::LEN as u16,
            checksum: 0,
        })
    }

    /// Get the header's source port. Zero is legal here (reserved by convention, but not
    /// rejected on the wire), so this returns the raw port value rather than a [`UdpPort`].
    #[must_use]
    pub const fn source(&self) -> u16 {
        self.0.source_port
    }

    /// Get the header's destination port. Zero is legal here (reserved by convention, but not
    /// rejected on the wire), so this returns the raw port value rather than a [`UdpPort`].
    #[must_use]
    pub const fn destination(&self) -> u16 {
        self.0.destination_port
    }

    /// The length of the packet (including the 8-byte UDP header), as advertised by the header.
    ///
    /// No attempt is made to ensure this value is correct.
    #[must_use]
    pub fn length(&self) -> u16 {
        self.0.length
    }
}

/// Errors which may occur when parsing a UDP header
#[derive(Debug, thiserror::Error)]
pub enum UdpParseError {}

impl Parse for Udp {
    type Error = UdpParseError;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        let (inner, rest) = UdpHeader::from_slice(buf).map_err(|e| {
            let expected = NonZero::new(e.required_len).unwrap_or_else(|| unreachable!());
            ParseError::Length(LengthError {
                expected,
                actual: buf.len(),
            })
        })?;
        assert!(
            rest.len() < buf.len(),
            "rest.len() >= buf.len() ({rest} >= {buf})",
            rest = rest.len(),
            buf = buf.len()
        );
        let consumed = NonZero::new(buf.len() - rest.len()).unwrap_or_else(|| unreachable!());
        Ok((Self(inner), consumed))
    }
}

impl DeParse for Udp {
    type Error = core::convert::Infallible;

    fn size(&self) -> NonZero<usize> {
        NonZero::new(self.0.header_len()).unwrap_or_else(|| unreachable!())
    }

    fn deparse(&self, buf: &mut [u8]) -> Result<NonZero<usize>, DeParseError<Self::Error>> {
        let len = buf.len();
        if len < self.size().into_non_zero_usize().get() {
            return Err(DeParseError::Length(LengthError {
                expected: self.size().into_non_zero_usize(),
                actual: len,
            }));
        }
        buf[..self.size().into_non_zero_usize().get()].copy_from_slice(&self.0.to_bytes());
        Ok(self.size())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Udp {
        Udp::new(
            UdpPort::new_checked(53000).unwrap(),
            UdpPort::new_checked(53).unwrap(),
        )
    }

    #[test]
    fn parse_back_round_trips() {
        let udp = sample();
        let mut buf = [0u8; Udp::LEN];
        let written = udp.deparse(&mut buf).unwrap();
        let (parsed, read) = Udp::parse(&buf).unwrap();
        assert_eq!(read, written);
        assert_eq!(parsed, udp);
    }

    #[test]
    fn zero_destination_port_is_decoded_not_rejected() {
        let mut buf = [0u8; Udp::LEN];
        sample().deparse(&mut buf).unwrap();
        buf[2] = 0;
        buf[3] = 0;
        let (udp, _) = Udp::parse(&buf).unwrap();
        assert_eq!(udp.destination(), 0);
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; Udp::LEN - 1];
        assert!(matches!(Udp::parse(&buf), Err(ParseError::Length(_))));
    }
}
