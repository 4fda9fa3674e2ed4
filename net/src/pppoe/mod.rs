// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PPPoE session-stage header and the PPP protocol field it carries.

use crate::parse::{LengthError, Parse, ParseError};
use std::convert::Infallible;
use std::num::NonZero;

/// The PPP protocol ID carried after the PPPoE session header.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PppProtocol(pub u16);

impl PppProtocol {
    /// PPP carrying an IPv4 payload.
    pub const IPV4: PppProtocol = PppProtocol(0x0021);
    /// PPP carrying an IPv6 payload.
    pub const IPV6: PppProtocol = PppProtocol(0x0057);
}

/// A PPPoE session-stage header (RFC 2516) plus the two-byte PPP protocol field that follows it.
///
/// Layout: 1 byte version/type, 1 byte code, 2 bytes session id, 2 bytes payload length,
/// 2 bytes PPP protocol -- 8 bytes total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pppoe {
    session_id: u16,
    payload_length: u16,
    ppp_protocol: PppProtocol,
}

impl Pppoe {
    /// The length (in bytes) of a PPPoE session header plus its PPP protocol field.
    pub const HEADER_LEN: usize = 8;

    /// The PPPoE session identifier.
    #[must_use]
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// The payload length advertised by the PPPoE header.
    #[must_use]
    pub fn payload_length(&self) -> u16 {
        self.payload_length
    }

    /// The PPP protocol of the encapsulated payload.
    #[must_use]
    pub fn ppp_protocol(&self) -> PppProtocol {
        self.ppp_protocol
    }
}

impl Parse for Pppoe {
    type Error = Infallible;

    fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), ParseError<Self::Error>> {
        if buf.len() < Self::HEADER_LEN {
            return Err(ParseError::Length(LengthError {
                expected: NonZero::new(Self::HEADER_LEN).unwrap_or_else(|| unreachable!()),
                actual: buf.len(),
            }));
        }
        let session_id = u16::from_be_bytes([buf[2], buf[3]]);
        let payload_length = u16::from_be_bytes([buf[4], buf[5]]);
        let ppp_protocol = PppProtocol(u16::from_be_bytes([buf[6], buf[7]]));
        Ok((
            Pppoe {
                session_id,
                payload_length,
                ppp_protocol,
            },
            NonZero::new(Self::HEADER_LEN).unwrap_or_else(|| unreachable!()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> [u8; Pppoe::HEADER_LEN] {
        let mut buf = [0u8; Pppoe::HEADER_LEN];
        buf[0] = 0x11; // version 1, type 1
        buf[1] = 0x00; // code: session data
        buf[2..4].copy_from_slice(&42u16.to_be_bytes());
        buf[4..6].copy_from_slice(&100u16.to_be_bytes());
        buf[6..8].copy_from_slice(&PppProtocol::IPV4.0.to_be_bytes());
        buf
    }

    #[test]
    fn parses_session_id_and_ppp_protocol() {
        let buf = sample();
        let (pppoe, consumed) = Pppoe::parse(&buf).unwrap();
        assert_eq!(consumed.get(), Pppoe::HEADER_LEN);
        assert_eq!(pppoe.session_id(), 42);
        assert_eq!(pppoe.payload_length(), 100);
        assert_eq!(pppoe.ppp_protocol(), PppProtocol::IPV4);
    }

    #[test]
    fn short_buffer_fails_closed() {
        let buf = [0u8; Pppoe::HEADER_LEN - 1];
        assert!(matches!(Pppoe::parse(&buf), Err(ParseError::Length(_))));
    }
}
