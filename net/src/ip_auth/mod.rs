// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IP authentication header (RFC 4302) type and parsing.
//!
//! May appear in either an IPv4 or an IPv6 header chain. The flow manager does not interpret
//! the authentication payload; it only needs the header's length (so it can skip past it) and
//! its next-header value.

use crate::ip::NextHeader;
use crate::parse::{Parse, ParseError};
use etherparse::IpAuthHeader;
use std::num::NonZero;

/// An IP authentication header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAuth(Box<IpAuthHeader>);

impl IpAuth {
    /// The next-header value carried by this authentication header.
    #[must_use]
    pub fn next_header(&self) -> NextHeader {
        NextHeader::new(self.0.next_header.0)
    }
}

impl Parse for IpAuth {
    type Error = etherparse::err::ip_auth::HeaderSliceError;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        let (inner, rest) = IpAuthHeader::from_slice(buf)
            .map(|(h, rest)| (Box::new(h), rest))
            .map_err(ParseError::Invalid)?;
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
