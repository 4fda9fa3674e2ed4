// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Helper methods and types which are common between IPv4 and IPv6

use crate::ipv4::UnicastIpv4Addr;
use crate::ipv6::UnicastIpv6Addr;
use etherparse::IpNumber;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Thin wrapper around [`IpNumber`].
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct NextHeader(pub(crate) IpNumber);

impl From<NextHeader> for IpNumber {
    fn from(value: NextHeader) -> Self {
        value.0
    }
}

impl NextHeader {
    /// TCP next header
    pub const TCP: NextHeader = NextHeader(IpNumber::TCP);
    /// UDP next header
    pub const UDP: NextHeader = NextHeader(IpNumber::UDP);
    /// ICMPv4 next header
    pub const ICMP: NextHeader = NextHeader(IpNumber::ICMP);
    /// ICMPv6 next header
    pub const ICMP6: NextHeader = NextHeader(IpNumber::IPV6_ICMP);
    /// SCTP next header
    pub const SCTP: NextHeader = NextHeader(IpNumber(132));
    /// GRE next header
    pub const GRE: NextHeader = NextHeader(IpNumber::GRE);
    /// IPv4-in-IP (protocol 4), used for IPv4-in-IPv6 tunnelling
    pub const IPV4: NextHeader = NextHeader(IpNumber::IPV4);
    /// IPv6-in-IP (protocol 41), used for IPv6-in-IPv6 tunnelling
    pub const IPV6: NextHeader = NextHeader(IpNumber::IPV6);
    /// IP authentication header
    pub const AUTH: NextHeader = NextHeader(IpNumber::AUTHENTICATION_HEADER);
    /// IPv6 hop-by-hop options header
    pub const HOP_BY_HOP: NextHeader = NextHeader(IpNumber::IPV6_HOP_BY_HOP);
    /// IPv6 routing header
    pub const ROUTING: NextHeader = NextHeader(IpNumber::IPV6_ROUTE_HEADER);
    /// IPv6 fragment header
    pub const FRAGMENT: NextHeader = NextHeader(IpNumber::IPV6_FRAGMENTATION_HEADER);
    /// IPv6 destination options header
    pub const DESTINATION_OPTIONS: NextHeader = NextHeader(IpNumber::IPV6_DESTINATION_OPTIONS);
    /// Mobility header (RFC 6275)
    pub const MOBILITY: NextHeader = NextHeader(IpNumber(135));
    /// Host Identity Protocol v2 header
    pub const HIP: NextHeader = NextHeader(IpNumber(139));
    /// Shim6 protocol header
    pub const SHIM6: NextHeader = NextHeader(IpNumber(140));
    /// Encapsulating security payload (header is skipped, payload is opaque)
    pub const ESP: NextHeader = NextHeader(IpNumber::IPV6_ENCAP_SEC_PAYLOAD);
    /// "No next header" (RFC 8200)
    pub const NO_NEXT_HEADER: NextHeader = NextHeader(IpNumber::IPV6_NO_NEXT_HEADER);

    /// Get the inner (wrapped) `etherparse` [`IpNumber`] type
    pub(crate) fn inner(self) -> IpNumber {
        self.0
    }

    /// Build a [`NextHeader`] from a raw protocol number.
    #[must_use]
    pub fn new(inner: u8) -> Self {
        Self(IpNumber::from(inner))
    }

    /// Return the [`NextHeader`] represented as a `u8`
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0 .0
    }
}

/// A union type for IPv4 and IPv6 unicast addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum UnicastIpAddr {
    /// A unicast Ipv4 address
    V4(UnicastIpv4Addr),
    /// A unicast Ipv6 address
    V6(UnicastIpv6Addr),
}

impl UnicastIpAddr {
    /// Get the inner (wrapped) [`IpAddr`] type
    #[must_use]
    pub fn inner(&self) -> IpAddr {
        match self {
            UnicastIpAddr::V4(ip) => IpAddr::V4(ip.inner()),
            UnicastIpAddr::V6(ip) => IpAddr::V6(ip.inner()),
        }
    }
}

impl TryFrom<IpAddr> for UnicastIpAddr {
    type Error = IpAddr;

    fn try_from(value: IpAddr) -> Result<UnicastIpAddr, IpAddr> {
        match value {
            IpAddr::V4(ip) => Ok(UnicastIpAddr::V4(
                UnicastIpv4Addr::new(ip).map_err(IpAddr::V4)?,
            )),
            IpAddr::V6(ip) => Ok(UnicastIpAddr::V6(
                UnicastIpv6Addr::new(ip).map_err(IpAddr::V6)?,
            )),
        }
    }
}

impl From<UnicastIpAddr> for IpAddr {
    fn from(value: UnicastIpAddr) -> Self {
        match value {
            UnicastIpAddr::V4(ip) => IpAddr::V4(ip.inner()),
            UnicastIpAddr::V6(ip) => IpAddr::V6(ip.inner()),
        }
    }
}

impl TryFrom<Ipv4Addr> for UnicastIpAddr {
    type Error = Ipv4Addr;

    fn try_from(value: Ipv4Addr) -> Result<Self, Self::Error> {
        Ok(UnicastIpAddr::V4(UnicastIpv4Addr::new(value)?))
    }
}

impl TryFrom<Ipv6Addr> for UnicastIpAddr {
    type Error = Ipv6Addr;

    fn try_from(value: Ipv6Addr) -> Result<Self, Self::Error> {
        Ok(UnicastIpAddr::V6(UnicastIpv6Addr::new(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_protocol_numbers_are_correct() {
        assert_eq!(NextHeader::TCP.as_u8(), 6);
        assert_eq!(NextHeader::UDP.as_u8(), 17);
        assert_eq!(NextHeader::GRE.as_u8(), 47);
        assert_eq!(NextHeader::SCTP.as_u8(), 132);
        assert_eq!(NextHeader::MOBILITY.as_u8(), 135);
        assert_eq!(NextHeader::HIP.as_u8(), 139);
        assert_eq!(NextHeader::SHIM6.as_u8(), 140);
    }

    #[test]
    fn multicast_address_is_rejected() {
        let multicast = IpAddr::V4(Ipv4Addr::new(224, 0, 0, 1));
        assert!(UnicastIpAddr::try_from(multicast).is_err());
    }

    #[test]
    fn unicast_address_round_trips() {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let unicast = UnicastIpAddr::try_from(addr).unwrap();
        assert_eq!(IpAddr::from(unicast), addr);
    }
}
