// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv6 header type and manipulation

use crate::ip::NextHeader;
pub use crate::ipv6::addr::UnicastIpv6Addr;
use crate::ipv6::flow_label::FlowLabel;
use crate::parse::{DeParse, DeParseError, IntoNonZeroUsize, LengthError, Parse, ParseError};
use etherparse::Ipv6Header;
use std::net::Ipv6Addr;
use std::num::NonZero;

pub mod addr;
pub mod flow_label;

/// An IPv6 header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ipv6(pub(crate) Ipv6Header);

impl Ipv6 {
    /// The length (in bytes) of an [`Ipv6`] header (fixed; IPv6 carries no header options).
    pub const LEN: usize = 40;

    fn new(header: Ipv6Header) -> Result<Self, Ipv6Error> {
        Ok(Self(header))
    }

    /// Get the source [`Ipv6Addr`] for this header. No address-class restriction is applied
    /// here; a multicast or otherwise non-unicast source is legal on the wire and decodes
    /// normally.
    #[must_use]
    pub fn source(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0.source)
    }

    /// Get the destination [`Ipv6Addr`] for this header
    #[must_use]
    pub fn destination(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0.destination)
    }

    /// Get the next-header value: either the upper-layer protocol, or the first extension
    /// header, depending on what follows.
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        NextHeader::new(self.0.next_header.0)
    }

    /// Get the hop limit for this header (analogous to [`crate::ipv4::Ipv4::ttl`])
    #[must_use]
    pub fn hop_limit(&self) -> u8 {
        self.0.hop_limit
    }

    /// Get the traffic class for this header
    #[must_use]
    pub fn traffic_class(&self) -> u8 {
        self.0.traffic_class
    }

    /// Get this header's flow label.
    #[must_use]
    pub fn flow_label(&self) -> FlowLabel {
        FlowLabel::new(self.0.flow_label.value()).unwrap_or_else(|_| unreachable!())
    }

    /// Get the payload length advertised by this header.
    #[must_use]
    pub fn payload_length(&self) -> u16 {
        self.0.payload_length
    }
}

/// Error which is triggered during construction of an [`Ipv6`] object.
#[derive(thiserror::Error, Debug)]
pub enum Ipv6Error {
    /// error triggered when etherparse fails to parse the header
    #[error(transparent)]
    Invalid(etherparse::err::ipv6::HeaderSliceError),
}

impl Parse for Ipv6 {
    type Error = Ipv6Error;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Ipv6::LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Ipv6::LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let (header, rest) =
            Ipv6Header::from_slice(buf).map_err(|e| ParseError::Invalid(Ipv6Error::Invalid(e)))?;
        assert!(
            rest.len() < buf.len(),
            "rest.len() >= buf.len() ({rest} >= {buf})",
            rest = rest.len(),
            buf = buf.len()
        );
        let consumed = NonZero::new(buf.len() - rest.len()).unwrap_or_else(|| unreachable!());
        Ok((Self::new(header).map_err(ParseError::Invalid)?, consumed))
    }
}

impl DeParse for Ipv6 {
    type Error = core::convert::Infallible;

    fn size(&self) -> NonZero<usize> {
        NonZero::new(Ipv6::LEN).unwrap_or_else(|| unreachable!())
    }

    fn deparse(&self, buf: &mut [u8]) -> Result<NonZero<usize>, DeParseError<Self::Error>> {
        let len = buf.len();
        if len < self.size().get() {
            return Err(DeParseError::Length(LengthError {
                expected: self.size().into_non_zero_usize(),
                actual: len,
            }));
        }
        buf[..self.size().get()].copy_from_slice(&self.0.to_bytes());
        Ok(self.size())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Ipv6Header {
        Ipv6Header {
            traffic_class: 0,
            flow_label: etherparse::Ipv6FlowLabel::try_new(0x1234).unwrap(),
            payload_length: 40,
            next_header: etherparse::IpNumber::TCP,
            hop_limit: 64,
            source: Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1).octets(),
            destination: Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 2).octets(),
        }
    }

    #[test]
    fn parse_back_round_trips() {
        let header = Ipv6::new(sample()).unwrap();
        let mut buf = [0u8; Ipv6::LEN];
        let written = header.deparse(&mut buf).unwrap();
        let (parsed, read) = Ipv6::parse(&buf).unwrap();
        assert_eq!(read, written);
        assert_eq!(parsed, header);
    }

    #[test]
    fn multicast_source_is_decoded_not_rejected() {
        let mut h = sample();
        h.source = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1).octets();
        let header = Ipv6::new(h).unwrap();
        assert_eq!(header.source(), Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1));
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; Ipv6::LEN - 1];
        assert!(matches!(Ipv6::parse(&buf), Err(ParseError::Length(_))));
    }
}
