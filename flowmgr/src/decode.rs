// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pure-function packet decoder: walks a chain of encapsulations and produces a canonical
//! [`Tuple`] plus, for TCP, the packet's flags word.
//!
//! The decoder never allocates and never panics on malformed input; every length check that
//! fails closes the whole decode with a [`DecodeError`] rather than returning a partial tuple.

use crate::frag_cache::FragmentCache;
use crate::tuple::{AddrPair, Endpoint, Tuple};
use flowmgr_net::eth::ethtype::EthType;
use flowmgr_net::eth::Eth;
use flowmgr_net::gre::Gre;
use flowmgr_net::ip::NextHeader;
use flowmgr_net::ip_auth::IpAuth;
use flowmgr_net::ipv4::Ipv4;
use flowmgr_net::ipv6::Ipv6;
use flowmgr_net::ipv6ext::{ExtHeader, FragmentHeader};
use flowmgr_net::mpls::Mpls;
use flowmgr_net::parse::{Parse, ParseError};
use flowmgr_net::pppoe::{Pppoe, PppProtocol};
use flowmgr_net::sctp::Sctp;
use flowmgr_net::tcp::Tcp;
use flowmgr_net::udp::Udp;
use flowmgr_net::vlan::Vlan;
use std::net::IpAddr;
use tracing::trace;

/// At most two 802.1Q/QinQ tags may be stacked before a decode is rejected.
const MAX_VLAN_TAGS: u8 = 2;
/// At most three MPLS labels may be stacked before a decode is rejected.
const MAX_MPLS_LABELS: u8 = 3;

/// Errors which terminate a decode before a tuple can be produced.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A header would have read past the end of the buffer.
    #[error("buffer truncated before a required header")]
    Truncated,
    /// An EtherType, PPP protocol ID, or IP protocol number this decoder does not understand.
    #[error("unsupported encapsulation")]
    UnsupportedEncapsulation,
    /// More VLAN tags or MPLS labels were stacked than this decoder will follow.
    #[error("excessive encapsulation nesting")]
    ExcessiveNesting,
    /// A non-initial IP fragment arrived with no matching first-fragment entry in the cache.
    #[error("no cached identity for this fragment")]
    FragmentMiss,
}

impl<E: core::error::Error> From<ParseError<E>> for DecodeError {
    fn from(value: ParseError<E>) -> Self {
        match value {
            ParseError::Length(_) => DecodeError::Truncated,
            ParseError::Invalid(_) => DecodeError::UnsupportedEncapsulation,
        }
    }
}

/// The result of a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// The flow's canonical identity.
    pub tuple: Tuple,
    /// The TCP flags word, if the innermost transport header was TCP.
    pub tcp_flags: Option<u16>,
    /// Byte offset of the start of the L3 (IP) header that carries the flow's identity.
    pub l3_header_offset: usize,
}

/// A forward-only cursor over the frame being decoded, tracking only how many bytes remain.
///
/// Modelled on [`flowmgr_net::parse::Reader`]: every `take`/`parse` call is checked against the
/// remaining length, so no header parser in the decode chain can read out of bounds.
struct Cursor<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> Cursor<'buf> {
    fn new(buf: &'buf [u8]) -> Cursor<'buf> {
        Cursor { buf, pos: 0 }
    }

    fn rest(&self) -> &'buf [u8] {
        &self.buf[self.pos..]
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn parse<T: Parse>(&mut self) -> Result<T, DecodeError> {
        let (value, consumed) = T::parse(self.rest())?;
        self.pos += consumed.get();
        Ok(value)
    }
}

/// Walk the L2/L3/L4 chain in `bytes` and produce a canonical [`Tuple`].
///
/// `start_at_l2` selects whether `bytes` begins with an Ethernet header (`true`) or an IP
/// header directly (`false`). The fragment cache is shared with (and owned by) the caller's
/// flow table; decoding a non-initial fragment consults it, and decoding a first fragment
/// populates it.
///
/// # Errors
///
/// See [`DecodeError`].
pub fn decode(
    bytes: &[u8],
    start_at_l2: bool,
    frag_cache: &mut FragmentCache,
    now_us: u64,
) -> Result<Decoded, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    if start_at_l2 {
        let eth: Eth = cursor.parse()?;
        decode_l2_payload(eth.ether_type(), &mut cursor, frag_cache, now_us, 0, 0)
    } else {
        match cursor.rest().first() {
            Some(byte) if byte >> 4 == 4 => decode_ipv4(&mut cursor, frag_cache, now_us),
            Some(byte) if byte >> 4 == 6 => decode_ipv6(&mut cursor, frag_cache, now_us),
            Some(_) => Err(DecodeError::UnsupportedEncapsulation),
            None => Err(DecodeError::Truncated),
        }
    }
}

fn decode_l2_payload(
    ether_type: EthType,
    cursor: &mut Cursor<'_>,
    frag_cache: &mut FragmentCache,
    now_us: u64,
    vlan_depth: u8,
    mpls_depth: u8,
) -> Result<Decoded, DecodeError> {
    match ether_type {
        EthType::VLAN | EthType::VLAN_QINQ | EthType::VLAN_DOUBLE_TAGGED => {
            if vlan_depth >= MAX_VLAN_TAGS {
                return Err(DecodeError::ExcessiveNesting);
            }
            let vlan: Vlan = cursor.parse()?;
            decode_l2_payload(
                vlan.inner_ethtype(),
                cursor,
                frag_cache,
                now_us,
                vlan_depth + 1,
                mpls_depth,
            )
        }
        EthType::MPLS_UNICAST | EthType::MPLS_MULTICAST => {
            if mpls_depth >= MAX_MPLS_LABELS {
                return Err(DecodeError::ExcessiveNesting);
            }
            let mpls: Mpls = cursor.parse()?;
            if mpls.bottom_of_stack() {
                decode_ipv4(cursor, frag_cache, now_us)
            } else {
                decode_l2_payload(ether_type, cursor, frag_cache, now_us, vlan_depth, mpls_depth + 1)
            }
        }
        EthType::PPPOE_SESSION => {
            let pppoe: Pppoe = cursor.parse()?;
            match pppoe.ppp_protocol() {
                PppProtocol::IPV4 => decode_ipv4(cursor, frag_cache, now_us),
                PppProtocol::IPV6 => decode_ipv6(cursor, frag_cache, now_us),
                _ => Err(DecodeError::UnsupportedEncapsulation),
            }
        }
        EthType::IPV4 => decode_ipv4(cursor, frag_cache, now_us),
        EthType::IPV6 => decode_ipv6(cursor, frag_cache, now_us),
        other => {
            trace!(ether_type = %other, "decode: unsupported outer ethertype");
            Err(DecodeError::UnsupportedEncapsulation)
        }
    }
}

fn decode_ipv4(
    cursor: &mut Cursor<'_>,
    frag_cache: &mut FragmentCache,
    now_us: u64,
) -> Result<Decoded, DecodeError> {
    let l3_header_offset = cursor.offset();
    let ipv4: Ipv4 = cursor.parse()?;
    let src = IpAddr::V4(ipv4.source());
    let dst = IpAddr::V4(ipv4.destination());
    let ip_id = u32::from(ipv4.identification());
    let pair = AddrPair::new(src, dst);

    if ipv4.fragment_offset().value() != 0 {
        let tuple = frag_cache.lookup(ip_id, pair).ok_or(DecodeError::FragmentMiss)?;
        if !ipv4.more_fragments() {
            frag_cache.consume(ip_id, pair);
        }
        return Ok(Decoded {
            tuple,
            tcp_flags: None,
            l3_header_offset,
        });
    }

    let remember = ipv4.more_fragments().then_some(ip_id);
    finish_after_fragmentation(
        IpVersion::V4,
        ipv4.protocol(),
        src,
        dst,
        remember,
        cursor,
        frag_cache,
        now_us,
        l3_header_offset,
    )
}

fn decode_ipv6(
    cursor: &mut Cursor<'_>,
    frag_cache: &mut FragmentCache,
    now_us: u64,
) -> Result<Decoded, DecodeError> {
    let l3_header_offset = cursor.offset();
    let ipv6: Ipv6 = cursor.parse()?;
    let src = IpAddr::V6(ipv6.source());
    let dst = IpAddr::V6(ipv6.destination());
    let mut next = ipv6.next_header();

    loop {
        next = match next {
            NextHeader::HOP_BY_HOP
            | NextHeader::DESTINATION_OPTIONS
            | NextHeader::ROUTING
            | NextHeader::MOBILITY
            | NextHeader::HIP
            | NextHeader::SHIM6 => {
                let ext: ExtHeader = cursor.parse()?;
                ext.next_header()
            }
            NextHeader::AUTH => {
                let auth: IpAuth = cursor.parse()?;
                auth.next_header()
            }
            NextHeader::FRAGMENT => {
                let frag: FragmentHeader = cursor.parse()?;
                let pair = AddrPair::new(src, dst);
                let frag_id = frag.identification();
                if frag.is_non_initial_fragment() {
                    let tuple = frag_cache
                        .lookup(frag_id, pair)
                        .ok_or(DecodeError::FragmentMiss)?;
                    if !frag.more_fragments() {
                        frag_cache.consume(frag_id, pair);
                    }
                    return Ok(Decoded {
                        tuple,
                        tcp_flags: None,
                        l3_header_offset,
                    });
                }
                let remember = frag.more_fragments().then_some(frag_id);
                return finish_after_fragmentation(
                    IpVersion::V6,
                    frag.next_header(),
                    src,
                    dst,
                    remember,
                    cursor,
                    frag_cache,
                    now_us,
                    l3_header_offset,
                );
            }
            NextHeader::IPV4 => return decode_ipv4(cursor, frag_cache, now_us),
            NextHeader::IPV6 => return decode_ipv6(cursor, frag_cache, now_us),
            other => {
                return finish_after_fragmentation(
                    IpVersion::V6,
                    other,
                    src,
                    dst,
                    None,
                    cursor,
                    frag_cache,
                    now_us,
                    l3_header_offset,
                )
            }
        };
    }
}

/// Which IP version reached the L4 dispatch, so it can gate version-specific protocol support
/// (SCTP is only ever dispatched for IPv6, matching the original decoder's IPv4 switch having no
/// SCTP case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpVersion {
    V4,
    V6,
}

/// Parse the L4 header named by `protocol` (or recurse through GRE) and, if this packet was the
/// first fragment of a datagram, remember its tuple under `remember_ip_id`.
fn finish_after_fragmentation(
    ip_version: IpVersion,
    protocol: NextHeader,
    src: IpAddr,
    dst: IpAddr,
    remember_ip_id: Option<u32>,
    cursor: &mut Cursor<'_>,
    frag_cache: &mut FragmentCache,
    now_us: u64,
    l3_header_offset: usize,
) -> Result<Decoded, DecodeError> {
    let (tuple, tcp_flags) = decode_l4(ip_version, protocol, src, dst, cursor, frag_cache, now_us)?;
    if let Some(ip_id) = remember_ip_id {
        frag_cache.remember(ip_id, AddrPair::new(src, dst), tuple, now_us);
    }
    Ok(Decoded {
        tuple,
        tcp_flags,
        l3_header_offset,
    })
}

fn decode_l4(
    ip_version: IpVersion,
    protocol: NextHeader,
    src: IpAddr,
    dst: IpAddr,
    cursor: &mut Cursor<'_>,
    frag_cache: &mut FragmentCache,
    now_us: u64,
) -> Result<(Tuple, Option<u16>), DecodeError> {
    match protocol {
        NextHeader::TCP => {
            let tcp: Tcp = cursor.parse()?;
            let tuple = Tuple::new(
                protocol.as_u8(),
                Endpoint::new(src, tcp.source()),
                Endpoint::new(dst, tcp.destination()),
            );
            Ok((tuple, Some(tcp_flags_word(&tcp))))
        }
        NextHeader::UDP => {
            let udp: Udp = cursor.parse()?;
            let tuple = Tuple::new(
                protocol.as_u8(),
                Endpoint::new(src, udp.source()),
                Endpoint::new(dst, udp.destination()),
            );
            Ok((tuple, None))
        }
        NextHeader::SCTP if ip_version == IpVersion::V6 => {
            let sctp: Sctp = cursor.parse()?;
            let tuple = Tuple::new(
                protocol.as_u8(),
                Endpoint::new(src, sctp.source()),
                Endpoint::new(dst, sctp.destination()),
            );
            Ok((tuple, None))
        }
        NextHeader::GRE => {
            let gre: Gre = cursor.parse()?;
            match gre.protocol() {
                EthType::IPV4 => decode_ipv4(cursor, frag_cache, now_us).map(from_decoded),
                EthType::IPV6 => decode_ipv6(cursor, frag_cache, now_us).map(from_decoded),
                _ => Err(DecodeError::UnsupportedEncapsulation),
            }
        }
        other => {
            trace!(protocol = other.as_u8(), "decode: upper-layer protocol carries no ports");
            let tuple = Tuple::new(other.as_u8(), Endpoint::new(src, 0), Endpoint::new(dst, 0));
            Ok((tuple, None))
        }
    }
}

fn from_decoded(decoded: Decoded) -> (Tuple, Option<u16>) {
    (decoded.tuple, decoded.tcp_flags)
}

fn tcp_flags_word(tcp: &Tcp) -> u16 {
    let mut flags = 0u16;
    if tcp.fin() {
        flags |= 0x001;
    }
    if tcp.syn() {
        flags |= 0x002;
    }
    if tcp.rst() {
        flags |= 0x004;
    }
    if tcp.psh() {
        flags |= 0x008;
    }
    if tcp.ack() {
        flags |= 0x010;
    }
    if tcp.urg() {
        flags |= 0x020;
    }
    if tcp.ece() {
        flags |= 0x040;
    }
    if tcp.cwr() {
        flags |= 0x080;
    }
    if tcp.ns() {
        flags |= 0x100;
    }
    flags
}

/// TCP flag-word bit positions, exposed for callers (principally the state machine) that need
/// to test individual flags without re-deriving the layout.
pub mod tcp_flag {
    /// FIN
    pub const FIN: u16 = 0x001;
    /// SYN
    pub const SYN: u16 = 0x002;
    /// RST
    pub const RST: u16 = 0x004;
    /// ACK
    pub const ACK: u16 = 0x010;
}

#[cfg(test)]
mod test {
    use super::*;
    use flowmgr_net::eth::mac::{DestinationMac, Mac, SourceMac};
    use flowmgr_net::parse::DeParse;
    use flowmgr_net::tcp::port::TcpPort;
    use flowmgr_net::udp::port::UdpPort;

    fn eth_bytes(ether_type: EthType) -> Vec<u8> {
        let eth = Eth::new(
            SourceMac::new(Mac([0x02, 0, 0, 0, 0, 1])).unwrap(),
            DestinationMac::new(Mac([0x02, 0, 0, 0, 0, 2])).unwrap(),
            ether_type,
        );
        let mut buf = [0u8; Eth::HEADER_LEN];
        eth.deparse(&mut buf).unwrap();
        buf.to_vec()
    }

    fn ipv4_udp_frame(src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut frame = eth_bytes(EthType::IPV4);
        let mut ip = etherparse_ipv4();
        let udp = Udp::new(
            UdpPort::new_checked(src_port).unwrap(),
            UdpPort::new_checked(dst_port).unwrap(),
        );
        let mut udp_buf = [0u8; Udp::LEN];
        udp.deparse(&mut udp_buf).unwrap();
        ip.extend_from_slice(&udp_buf);
        frame.extend_from_slice(&ip);
        frame
    }

    // Builds a minimal, valid IPv4 header (protocol UDP, no options) as raw bytes, without
    // going through `flowmgr_net::ipv4::Ipv4` (which has no public constructor outside tests).
    fn etherparse_ipv4() -> Vec<u8> {
        let header = etherparse::Ipv4Header::new(
            Udp::LEN as u16,
            64,
            etherparse::IpNumber::UDP,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
        )
        .unwrap();
        header.to_bytes().to_vec()
    }

    // Same header shape, but with the protocol byte overwritten to SCTP, so a decode can be
    // driven through the IPv4 path with an upper-layer protocol the IPv4 dispatch never parses.
    fn ipv4_sctp_frame() -> Vec<u8> {
        let mut frame = eth_bytes(EthType::IPV4);
        let header = etherparse::Ipv4Header::new(
            Sctp::LEN as u16,
            64,
            etherparse::IpNumber::UDP,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
        )
        .unwrap();
        let mut ip = header.to_bytes().to_vec();
        ip[9] = NextHeader::SCTP.as_u8();
        let mut sctp_buf = [0u8; Sctp::LEN];
        sctp_buf[0..2].copy_from_slice(&1000u16.to_be_bytes());
        sctp_buf[2..4].copy_from_slice(&2000u16.to_be_bytes());
        ip.extend_from_slice(&sctp_buf);
        frame.extend_from_slice(&ip);
        frame
    }

    #[test]
    fn decodes_plain_ethernet_ipv4_udp() {
        let frame = ipv4_udp_frame(40000, 53);
        let mut cache = FragmentCache::new(128, 30_000_000);
        let decoded = decode(&frame, true, &mut cache, 0).unwrap();
        assert_eq!(decoded.tuple.protocol(), 17);
        assert_eq!(decoded.tuple.lower().port, 53);
        assert_eq!(decoded.tuple.upper().port, 40000);
        assert_eq!(decoded.tcp_flags, None);
    }

    #[test]
    fn third_vlan_tag_is_rejected() {
        let mut frame = eth_bytes(EthType::VLAN);
        // Three stacked tags, each claiming the next is also a VLAN tag; parses far enough to
        // hit the depth check before running out of bytes.
        for _ in 0..3 {
            frame.extend_from_slice(&[0x00, 0x0A, 0x81, 0x00]);
        }
        frame.extend_from_slice(&[0x08, 0x00]);
        let mut cache = FragmentCache::new(128, 30_000_000);
        assert_eq!(
            decode(&frame, true, &mut cache, 0),
            Err(DecodeError::ExcessiveNesting)
        );
    }

    #[test]
    fn truncated_ethernet_header_fails_closed() {
        let frame = [0u8; 4];
        let mut cache = FragmentCache::new(128, 30_000_000);
        assert_eq!(
            decode(&frame, true, &mut cache, 0),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn l3_only_frame_detects_ipv4_by_version_nibble() {
        let frame = ipv4_udp_frame(1000, 2000);
        let l3_only = &frame[Eth::HEADER_LEN..];
        let mut cache = FragmentCache::new(128, 30_000_000);
        let decoded = decode(l3_only, false, &mut cache, 0).unwrap();
        assert_eq!(decoded.tuple.lower().port, 1000);
    }

    #[test]
    fn ipv4_sctp_is_not_port_parsed() {
        let frame = ipv4_sctp_frame();
        let mut cache = FragmentCache::new(128, 30_000_000);
        let decoded = decode(&frame, true, &mut cache, 0).unwrap();
        assert_eq!(decoded.tuple.protocol(), NextHeader::SCTP.as_u8());
        assert_eq!(decoded.tuple.lower().port, 0);
        assert_eq!(decoded.tuple.upper().port, 0);
    }

    #[test]
    fn tcp_flags_word_reports_syn() {
        let tcp = Tcp::new(
            TcpPort::new_checked(1000).unwrap(),
            TcpPort::new_checked(2000).unwrap(),
        );
        let mut tcp = tcp;
        tcp.set_syn(true);
        assert_eq!(tcp_flags_word(&tcp) & tcp_flag::SYN, tcp_flag::SYN);
        assert_eq!(tcp_flags_word(&tcp) & tcp_flag::ACK, 0);
    }
}
