// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 header type and manipulation

use crate::ip::NextHeader;
pub use crate::ipv4::addr::UnicastIpv4Addr;
use crate::ipv4::dscp::Dscp;
use crate::ipv4::ecn::Ecn;
use crate::ipv4::frag_offset::FragOffset;
use crate::parse::{DeParse, DeParseError, IntoNonZeroUsize, LengthError, Parse, ParseError};
use etherparse::Ipv4Header;
use std::net::Ipv4Addr;
use std::num::NonZero;

pub mod addr;
pub mod dscp;
pub mod ecn;
pub mod frag_offset;

/// An IPv4 header
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ipv4(pub(crate) Ipv4Header);

impl Ipv4 {
    /// The minimum length of an IPv4 header (i.e., a header with no options)
    pub const MIN_LEN: usize = 20;

    /// The maximum length of an IPv4 header (i.e., a header with full options)
    pub const MAX_LEN: usize = 60;

    fn new(header: Ipv4Header) -> Result<Self, Ipv4Error> {
        Ok(Self(header))
    }

    /// Get the source ip address of the header. No address-class restriction is applied here;
    /// a multicast or otherwise non-unicast source is legal on the wire and decodes normally.
    #[must_use]
    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.0.source)
    }

    /// Get the destination ip address of the header
    #[must_use]
    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.0.destination)
    }

    /// Get the next layer protocol which follows this header.
    #[must_use]
    pub fn protocol(&self) -> NextHeader {
        NextHeader::new(self.0.protocol.0)
    }

    /// Length of the header (includes options) in bytes.
    #[must_use]
    pub fn header_len(&self) -> usize {
        self.0.header_len()
    }

    /// Value of the total length IP header field (header + payload, in bytes).
    #[must_use]
    pub fn total_len(&self) -> u16 {
        self.0.total_len
    }

    /// The number of routing hops the packet is allowed to take.
    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.0.time_to_live
    }

    /// Get the header's differentiated services code point.
    #[must_use]
    pub fn dscp(&self) -> Dscp {
        Dscp(self.0.dscp)
    }

    /// Get the header's explicit congestion notification.
    #[must_use]
    pub fn ecn(&self) -> Ecn {
        Ecn(self.0.ecn)
    }

    /// Returns true if the "don't fragment" bit is set in this header.
    #[must_use]
    pub fn dont_fragment(&self) -> bool {
        self.0.dont_fragment
    }

    /// Returns true if the "more-fragments" bit is set in this header.
    #[must_use]
    pub fn more_fragments(&self) -> bool {
        self.0.more_fragments
    }

    /// The position, relative to the original (unfragmented) payload, at which this packet's
    /// payload belongs. Zero for unfragmented packets and the first fragment of a fragmented one.
    #[must_use]
    pub fn fragment_offset(&self) -> FragOffset {
        FragOffset(self.0.fragment_offset)
    }

    /// Return true if this header describes a fragment of a larger, fragmented datagram (either
    /// a non-final fragment, or a final fragment at a nonzero offset).
    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset().value() != 0
    }

    /// Return the header's "identification" field, used to associate the fragments of a single
    /// original datagram with one another.
    #[must_use]
    pub fn identification(&self) -> u16 {
        self.0.identification
    }
}

/// Error which is triggered during construction of an [`Ipv4`] object.
#[derive(thiserror::Error, Debug)]
pub enum Ipv4Error {
    /// Error triggered when etherparse fails to parse the header.
    #[error(transparent)]
    Invalid(etherparse::err::ipv4::HeaderSliceError),
}

impl Parse for Ipv4 {
    type Error = Ipv4Error;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        let (etherparse_header, rest) =
            Ipv4Header::from_slice(buf).map_err(|e| ParseError::Invalid(Ipv4Error::Invalid(e)))?;
        assert!(
            rest.len() < buf.len(),
            "rest.len() >= buf.len() ({rest} >= {buf})",
            rest = rest.len(),
            buf = buf.len()
        );
        let consumed = NonZero::new(buf.len() - rest.len()).unwrap_or_else(|| unreachable!());
        Ok((
            Self::new(etherparse_header).map_err(ParseError::Invalid)?,
            consumed,
        ))
    }
}

impl DeParse for Ipv4 {
    type Error = core::convert::Infallible;

    fn size(&self) -> NonZero<usize> {
        NonZero::new(self.0.header_len()).unwrap_or_else(|| unreachable!())
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
