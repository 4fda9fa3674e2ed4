// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Canonical flow identity: a protocol plus a direction-independent pair of endpoints.

use ahash::RandomState;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::OnceLock;

fn mixer() -> &'static RandomState {
    static MIXER: OnceLock<RandomState> = OnceLock::new();
    MIXER.get_or_init(|| RandomState::with_seeds(0, 0, 0, 0))
}

/// One side of a flow: an address and a port.
///
/// `port` is `0` for protocols that carry no port (anything other than TCP/UDP/SCTP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// The endpoint's address.
    pub address: IpAddr,
    /// The endpoint's port, or `0` if the protocol carries none.
    pub port: u16,
}

impl Endpoint {
    /// Build an [`Endpoint`].
    #[must_use]
    pub fn new(address: IpAddr, port: u16) -> Endpoint {
        Endpoint { address, port }
    }
}

/// A flow's canonical identity: an IP protocol number plus the two endpoints that exchange
/// traffic under it.
///
/// Two tuples built from opposite directions of the same session (`A:x -> B:y` and `B:y ->
/// A:x`) compare equal and hash equal: equality and hashing both go through [`Tuple::lower`] /
/// [`Tuple::upper`] rather than `src`/`dst` directly.
#[derive(Debug, Clone, Copy)]
pub struct Tuple {
    protocol: u8,
    src: Endpoint,
    dst: Endpoint,
    cached_hash: u64,
}

impl Tuple {
    /// Build a [`Tuple`], memoising its canonical hash.
    #[must_use]
    pub fn new(protocol: u8, src: Endpoint, dst: Endpoint) -> Tuple {
        let mut tuple = Tuple {
            protocol,
            src,
            dst,
            cached_hash: 0,
        };
        tuple.cached_hash = tuple.compute_hash();
        tuple
    }

    /// The IP protocol number (e.g. 6 for TCP, 17 for UDP).
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Whichever endpoint has the numerically smaller port; ties are broken in favor of `src`.
    #[must_use]
    pub fn lower(&self) -> Endpoint {
        if self.dst.port < self.src.port {
            self.dst
        } else {
            self.src
        }
    }

    /// The endpoint [`Tuple::lower`] did not return.
    #[must_use]
    pub fn upper(&self) -> Endpoint {
        if self.dst.port < self.src.port {
            self.src
        } else {
            self.dst
        }
    }

    /// The endpoint that sent the packet this tuple was built from.
    #[must_use]
    pub fn src(&self) -> Endpoint {
        self.src
    }

    /// The endpoint that received the packet this tuple was built from.
    #[must_use]
    pub fn dst(&self) -> Endpoint {
        self.dst
    }

    /// The memoised, equality-preserving hash of the canonical tuple.
    ///
    /// Mixes the weak `(lower.port << 16) | upper.port` concatenation through `ahash` rather
    /// than using it directly, so that tables keyed on many same-port flows (e.g. many sessions
    /// to `:80`) don't pile into a handful of buckets.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.cached_hash
    }

    fn compute_hash(&self) -> u64 {
        let lower = self.lower();
        let upper = self.upper();
        let weak = (u32::from(lower.port) << 16) | u32::from(upper.port);
        mixer().hash_one(weak)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.lower() == other.lower()
            && self.upper() == other.upper()
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash);
    }
}

/// An unordered pair of addresses, used to match fragments of one datagram without regard to
/// which address was the source and which was the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrPair {
    low: IpAddr,
    high: IpAddr,
}

impl AddrPair {
    /// Build an order-independent address pair: `{a, b}` equals `{b, a}`.
    #[must_use]
    pub fn new(a: IpAddr, b: IpAddr) -> AddrPair {
        if a <= b {
            AddrPair { low: a, high: b }
        } else {
            AddrPair { low: b, high: a }
        }
    }
}
