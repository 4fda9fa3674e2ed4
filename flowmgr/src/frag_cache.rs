// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Maps `(ip-id, address-pair)` to the tuple of the first fragment of a datagram, so that later
//! fragments -- which carry no L4 ports of their own -- can still be matched to the right flow.

use crate::tuple::{AddrPair, Tuple};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct Entry {
    ip_id: u32,
    pair: AddrPair,
    tuple: Tuple,
    timestamp_us: u64,
}

/// Per-table cache linking non-initial IP fragments back to the tuple of their first fragment.
///
/// Identity recovery here is best-effort: the cache keys on `(ip_id, address pair)`, and under
/// heavy cross-flow fragmentation two unrelated datagrams can collide on both. The table does
/// not guard against this; it mirrors what a bounded-memory fragment tracker can actually promise.
#[derive(Debug, Clone)]
pub struct FragmentCache {
    entries: Vec<Entry>,
    max_depth: usize,
    expiry_us: u64,
}

impl FragmentCache {
    /// Build a cache with the given depth cap and entry expiry (both in the units `remember`'s
    /// `now` is expressed in -- flowmgr uses microseconds throughout, so `expiry` should be too).
    #[must_use]
    pub fn new(max_depth: usize, expiry_us: u64) -> FragmentCache {
        FragmentCache {
            entries: Vec::new(),
            max_depth,
            expiry_us,
        }
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the tuple of the first fragment of the datagram identified by `(ip_id, pair)`.
    ///
    /// `pair` equality is order-independent and ignores ports, matching how fragments after the
    /// first carry no L4 header of their own.
    #[must_use]
    pub fn lookup(&self, ip_id: u32, pair: AddrPair) -> Option<Tuple> {
        let found = self
            .entries
            .iter()
            .find(|e| e.ip_id == ip_id && e.pair == pair)
            .map(|e| e.tuple);
        if found.is_none() {
            trace!(ip_id, "frag_cache: lookup miss");
        }
        found
    }

    /// Remove the entry for `(ip_id, pair)`, typically on arrival of the last fragment.
    pub fn consume(&mut self, ip_id: u32, pair: AddrPair) {
        let before = self.entries.len();
        self.entries.retain(|e| !(e.ip_id == ip_id && e.pair == pair));
        if self.entries.len() != before {
            debug!(ip_id, "frag_cache: consumed entry");
        }
    }

    /// Insert `(ip_id, tuple)` as the identity of a first fragment observed at `now_us`.
    ///
    /// If the cache is already at its depth cap, entries older than the expiry are swept first.
    /// If the sweep frees nothing, the insert is silently dropped: the current packet still
    /// decodes successfully, but later fragments of this datagram will miss.
    pub fn remember(&mut self, ip_id: u32, pair: AddrPair, tuple: Tuple, now_us: u64) {
        if self.entries.len() >= self.max_depth {
            self.sweep(now_us);
            if self.entries.len() >= self.max_depth {
                debug!(ip_id, "frag_cache: full after sweep, dropping insert");
                return;
            }
        }
        self.entries.push(Entry {
            ip_id,
            pair,
            tuple,
            timestamp_us: now_us,
        });
        debug!(ip_id, "frag_cache: remembered first fragment");
    }

    fn sweep(&mut self, now_us: u64) {
        let expiry = self.expiry_us;
        self.entries
            .retain(|e| now_us.saturating_sub(e.timestamp_us) <= expiry);
    }
}
