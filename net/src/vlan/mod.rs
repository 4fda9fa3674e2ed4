// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN validation and manipulation.

use crate::eth::ethtype::EthType;
use crate::parse::{DeParse, DeParseError, LengthError, Parse, ParseError};
use core::num::NonZero;
use etherparse::{SingleVlanHeader, VlanId, VlanPcp};

/// A VLAN Identifier.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vid(NonZero<u16>);

/// Errors which can occur when converting a `u16` to a validated [`Vid`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVid {
    /// 0 is a reserved [`Vid`] meaning "the native vlan."
    #[error("zero is a reserved Vid")]
    Zero,
    /// 4095 is reserved per the spec.
    #[error("4095 is a reserved Vid")]
    Reserved,
    /// The value is too large to be a legal [`Vid`] (12-bit max).
    #[error("{0} is too large to be a legal Vid")]
    TooLarge(u16),
}

impl InvalidVid {
    const RESERVED: u16 = 4095;
}

impl Vid {
    /// The minimum legal [`Vid`] value (1).
    pub const MIN: Vid = Vid(NonZero::new(1).unwrap());
    /// The maximum legal [`Vid`] value (2^12 - 2).
    pub const MAX: Vid = Vid(NonZero::new(4094).unwrap());

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 0, 4095 (reserved), or greater than [`Vid::MAX`].
    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vid) {
            None => Err(InvalidVid::Zero),
            Some(val) if val.get() == InvalidVid::RESERVED => Err(InvalidVid::Reserved),
            Some(val) if val.get() > InvalidVid::RESERVED => Err(InvalidVid::TooLarge(val.get())),
            Some(val) => Ok(Vid(val)),
        }
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0.get()
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.as_u16()
    }
}

/// A Priority Code Point.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pcp(u8);

impl Pcp {
    /// Map the [`Pcp`] value back to a `u8`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<Pcp> for VlanPcp {
    fn from(value: Pcp) -> Self {
        #[allow(unsafe_code)] // validity overlap checked between libraries
        unsafe {
            Self::new_unchecked(value.as_u8())
        }
    }
}

impl From<VlanPcp> for Pcp {
    fn from(value: VlanPcp) -> Self {
        Pcp(value.value())
    }
}

/// A VLAN header. May represent 802.1Q or 802.1AD (the outer ethtype that selected this header
/// is not stored here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vlan(SingleVlanHeader);

impl Vlan {
    /// The length (in bytes) of a VLAN tag.
    pub const HEADER_LEN: usize = 4;

    /// Get the [`Vid`] of this `Vlan` header.
    #[must_use]
    pub fn vid(&self) -> Vid {
        // validity already checked during parse
        Vid::new(self.0.vlan_id.value()).unwrap_or_else(|_| unreachable!())
    }

    /// Get the header's [`Pcp`]
    #[must_use]
    pub fn pcp(&self) -> Pcp {
        self.0.pcp.into()
    }

    /// Get the inner ethtype carried by this VLAN tag (the ethertype of whatever follows).
    #[must_use]
    pub fn inner_ethtype(&self) -> EthType {
        EthType(self.0.ether_type)
    }
}

impl Parse for Vlan {
    type Error = InvalidVid;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        let (inner, rest) = SingleVlanHeader::from_slice(buf).map_err(|e| {
            let expected = NonZero::new(e.required_len).unwrap_or_else(|| unreachable!());
            ParseError::Length(LengthError {
                expected,
                actual: buf.len(),
            })
        })?;
        Vid::new(inner.vlan_id.value()).map_err(ParseError::Invalid)?;
        let consumed = NonZero::new(buf.len() - rest.len()).ok_or_else(|| unreachable!())?;
        Ok((Self(inner), consumed))
    }
}

impl DeParse for Vlan {
    type Error = ();

    fn size(&self) -> NonZero<usize> {
        NonZero::new(self.0.header_len()).unwrap_or_else(|| unreachable!())
    }

    fn deparse(&self, buf: &mut [u8]) -> Result<NonZero<usize>, DeParseError<Self::Error>> {
        let len = buf.len();
        if len < self.size().get() {
            return Err(DeParseError::Length(LengthError {
                expected: self.size(),
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

    #[test]
    fn vid_zero_is_invalid() {
        assert_eq!(Vid::new(0), Err(InvalidVid::Zero));
    }

    #[test]
    fn vid_reserved_is_invalid() {
        assert_eq!(Vid::new(4095), Err(InvalidVid::Reserved));
    }

    #[test]
    fn vid_too_large_is_invalid() {
        assert_eq!(Vid::new(4096), Err(InvalidVid::TooLarge(4096)));
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; Vlan::HEADER_LEN - 1];
        match Vlan::parse(&buf) {
            Err(ParseError::Length(e)) => assert_eq!(e.actual, buf.len()),
            other => unreachable!("expected length error, got {other:?}"),
        }
    }
}
