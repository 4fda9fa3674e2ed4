// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The flow table: a hash-indexed arena of [`Flow`] records with per-state expiry queues.
//!
//! Storage is an index-based arena (`Vec<Option<Slot>>`) with three intrusive doubly-linked
//! lists (one per [`FlowState`]) threaded through it via `prev`/`next` slot indices -- the
//! single-threaded analogue of the sharded `DashMap<FlowKey, Weak<FlowInfo>>` plus
//! `ThreadLocalPriorityQueue` the teacher's multithreaded `pkt-meta::flow_table` uses. A table
//! here is only ever touched by one caller at a time (see the crate-level docs), so the
//! sharding and atomic reference counting that pattern exists for is unneeded, and a plain
//! `HashMap` plus parallel-array linked lists is enough to get O(1) lookup, insert, and
//! re-queue.

use crate::decode;
use crate::flow::{Flow, FlowState};
use crate::frag_cache::FragmentCache;
use crate::state_machine;
use crate::tuple::Tuple;
use ahash::RandomState;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Tunable timeouts and capacities for a [`FlowTable`].
///
/// Populated by the caller; parsing these values out of a config file or CLI flags is outside
/// this crate's scope (see the crate-level docs), matching how `qmonnet-dataplane`'s
/// `dataplane-config` crate keeps the typed config struct separate from where its values come
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// Lifetime, in seconds, of a flow in the [`FlowState::New`] bucket.
    pub new_timeout_secs: u64,
    /// Lifetime, in seconds, of a flow in the [`FlowState::Open`] bucket.
    pub open_timeout_secs: u64,
    /// Lifetime, in seconds, of a flow in the [`FlowState::Closed`] bucket.
    pub closed_timeout_secs: u64,
    /// Maximum number of entries the fragment identity cache will hold before it starts
    /// sweeping on insert pressure.
    pub max_frag_depth: usize,
    /// Age, in microseconds, past which a fragment cache entry is eligible for eviction.
    pub frag_expiry_us: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            new_timeout_secs: 30,
            open_timeout_secs: 300,
            closed_timeout_secs: 10,
            max_frag_depth: 128,
            frag_expiry_us: 30_000_000,
        }
    }
}

/// Errors produced by a rejected insert.
///
/// `FlowTable::get_full` collapses this to `None` at its public seam (a capacity reject is an
/// expected, frequent outcome under load, not an exceptional one) but the reason is still logged
/// through this type.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The table already holds `max` flows.
    #[error("table at capacity ({max} flows)")]
    CapacityExceeded {
        /// The table's configured capacity.
        max: u64,
    },
}

struct Slot {
    flow: Flow,
    bucket: FlowState,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
struct Queue {
    head: Option<usize>,
    tail: Option<usize>,
}

fn bucket_index(state: FlowState) -> usize {
    match state {
        FlowState::New => 0,
        FlowState::Open => 1,
        FlowState::Closed => 2,
    }
}

fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A single-threaded, hash-indexed table of flows with state-dependent expiry.
///
/// All mutating operations (`get_full`, `expire`, `set_max`) require `&mut self`, which gives
/// the single-writer rule the crate's concurrency model describes for free at compile time: a
/// caller sharing one table across threads supplies its own `Mutex<FlowTable>`, or shards
/// packets across one table per worker, exactly as the model intends.
pub struct FlowTable {
    config: TableConfig,
    max: u64,
    arena: Vec<Option<Slot>>,
    free: Vec<usize>,
    map: HashMap<Tuple, usize, RandomState>,
    queues: [Queue; 3],
    frag_cache: FragmentCache,
    hits: u64,
    misses: u64,
}

impl FlowTable {
    /// Build an empty, unbounded table (`max = 0`) with the given configuration.
    #[must_use]
    pub fn new(config: TableConfig) -> FlowTable {
        FlowTable {
            frag_cache: FragmentCache::new(config.max_frag_depth, config.frag_expiry_us),
            config,
            max: 0,
            arena: Vec::new(),
            free: Vec::new(),
            map: HashMap::default(),
            queues: [Queue::default(), Queue::default(), Queue::default()],
            hits: 0,
            misses: 0,
        }
    }

    /// Number of flows currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Number of lookups that matched an existing flow (whether or not `update` was requested).
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of lookups that created a new flow.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The configured capacity (`0` means unbounded).
    #[must_use]
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Set the table's capacity. Does not evict existing flows, even if that puts the table over
    /// the new cap; the cap only governs future inserts.
    pub fn set_max(&mut self, max: u64) {
        self.max = max;
    }

    /// Decode `bytes`, look up (or insert) the resulting flow, and optionally apply the
    /// lifecycle state machine to it.
    ///
    /// `timestamp_us` defaults to the wall clock when `None`. `start_at_l2` selects whether
    /// `bytes` begins with an Ethernet header or an IP header directly. Returns the matched or
    /// newly created flow together with the byte offset of its L3 header, or `None` if the
    /// frame failed to decode or (on a miss) the table is at capacity.
    pub fn get_full(
        &mut self,
        bytes: &[u8],
        timestamp_us: Option<u64>,
        update: bool,
        start_at_l2: bool,
    ) -> Option<(&Flow, usize)> {
        let now = timestamp_us.unwrap_or_else(wall_clock_us);
        let decoded = match decode::decode(bytes, start_at_l2, &mut self.frag_cache, now) {
            Ok(decoded) => decoded,
            Err(e) => {
                trace!(error = ?e, "get_full: decode failed");
                return None;
            }
        };
        let from_lower = decoded.tuple.src() == decoded.tuple.lower();

        if let Some(&idx) = self.map.get(&decoded.tuple) {
            self.hits += 1;
            if update {
                self.unlink(idx);
                let new_state = {
                    let slot = self.arena[idx].as_mut().unwrap_or_else(|| unreachable!());
                    state_machine::apply(&mut slot.flow, decoded.tcp_flags, from_lower, &self.config);
                    slot.flow.touch(now, decoded.tcp_flags);
                    slot.flow.state()
                };
                self.link_tail(idx, new_state);
                debug!(hash = decoded.tuple.hash(), "get_full: hit, updated");
            } else {
                debug!(hash = decoded.tuple.hash(), "get_full: hit, no update requested");
            }
            let slot = self.arena[idx].as_ref().unwrap_or_else(|| unreachable!());
            return Some((&slot.flow, decoded.l3_header_offset));
        }

        if self.max > 0 && self.map.len() as u64 >= self.max {
            let err = InsertError::CapacityExceeded { max: self.max };
            debug!(error = %err, "get_full: miss rejected");
            return None;
        }

        let mut flow = Flow::new(decoded.tuple, from_lower, self.config.new_timeout_secs, now);
        state_machine::apply(&mut flow, decoded.tcp_flags, from_lower, &self.config);
        let bucket = flow.state();
        let idx = self.insert_slot(flow, bucket);
        self.map.insert(decoded.tuple, idx);
        self.misses += 1;
        debug!(hash = decoded.tuple.hash(), "get_full: miss, inserted new flow");
        let slot = self.arena[idx].as_ref().unwrap_or_else(|| unreachable!());
        Some((&slot.flow, decoded.l3_header_offset))
    }

    /// Convenience over [`FlowTable::get_full`]: no explicit timestamp, no state update on hit,
    /// assumes `bytes` starts with an Ethernet header.
    pub fn get(&mut self, bytes: &[u8]) -> Option<&Flow> {
        self.get_full(bytes, None, false, true).map(|(flow, _)| flow)
    }

    /// Return and remove the oldest flow due for expiry at `now_us`, if any.
    ///
    /// Checks the three expiry queues in `New -> Open -> Closed` order and returns the first
    /// head whose `last_seen_us + lifetime_secs * 1_000_000 <= now_us`. The returned flow is
    /// already unlinked from the table; there is no separate "finalize" step to call.
    pub fn expire(&mut self, now_us: u64) -> Option<Flow> {
        for state in [FlowState::New, FlowState::Open, FlowState::Closed] {
            let head = self.queues[bucket_index(state)].head;
            if let Some(idx) = head {
                let slot = self.arena[idx].as_ref().unwrap_or_else(|| unreachable!());
                let due_at = slot
                    .flow
                    .last_seen_us()
                    .saturating_add(slot.flow.lifetime_secs().saturating_mul(1_000_000));
                if due_at <= now_us {
                    let flow = self.remove_slot(idx);
                    debug!(hash = flow.hash(), "expire: flow expired");
                    return Some(flow);
                }
            }
        }
        None
    }

    /// Visit every flow exactly once, in queue order (`New`, then `Open`, then `Closed`).
    ///
    /// The table must not be mutated from within `callback`; callers that need to delete flows
    /// while iterating should collect candidates first and delete afterward.
    pub fn foreach<F: FnMut(&Flow)>(&self, mut callback: F) {
        for state in [FlowState::New, FlowState::Open, FlowState::Closed] {
            let mut cursor = self.queues[bucket_index(state)].head;
            while let Some(idx) = cursor {
                let slot = self.arena[idx].as_ref().unwrap_or_else(|| unreachable!());
                callback(&slot.flow);
                cursor = slot.next;
            }
        }
    }

    fn insert_slot(&mut self, flow: Flow, bucket: FlowState) -> usize {
        let slot = Slot {
            flow,
            bucket,
            prev: None,
            next: None,
        };
        let idx = if let Some(free) = self.free.pop() {
            self.arena[free] = Some(slot);
            free
        } else {
            self.arena.push(Some(slot));
            self.arena.len() - 1
        };
        self.link_tail(idx, bucket);
        idx
    }

    fn remove_slot(&mut self, idx: usize) -> Flow {
        self.unlink(idx);
        let slot = self.arena[idx].take().unwrap_or_else(|| unreachable!());
        self.map.remove(&slot.flow.tuple());
        self.free.push(idx);
        slot.flow
    }

    fn unlink(&mut self, idx: usize) {
        let (bucket, prev, next) = {
            let slot = self.arena[idx].as_ref().unwrap_or_else(|| unreachable!());
            (slot.bucket, slot.prev, slot.next)
        };
        let qi = bucket_index(bucket);
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap_or_else(|| unreachable!()).next = next,
            None => self.queues[qi].head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap_or_else(|| unreachable!()).prev = prev,
            None => self.queues[qi].tail = prev,
        }
    }

    fn link_tail(&mut self, idx: usize, bucket: FlowState) {
        let qi = bucket_index(bucket);
        let old_tail = self.queues[qi].tail;
        {
            let slot = self.arena[idx].as_mut().unwrap_or_else(|| unreachable!());
            slot.prev = old_tail;
            slot.next = None;
            slot.bucket = bucket;
        }
        match old_tail {
            Some(t) => self.arena[t].as_mut().unwrap_or_else(|| unreachable!()).next = Some(idx),
            None => self.queues[qi].head = Some(idx),
        }
        self.queues[qi].tail = Some(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmgr_net::eth::ethtype::EthType;
    use flowmgr_net::eth::mac::{DestinationMac, Mac, SourceMac};
    use flowmgr_net::eth::Eth;
    use flowmgr_net::parse::DeParse;
    use flowmgr_net::tcp::port::TcpPort;
    use flowmgr_net::tcp::Tcp;
    use flowmgr_net::udp::port::UdpPort;
    use flowmgr_net::udp::Udp;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    // 2-byte TCI (PCP/DEI/VID, value unused by the decoder) followed by the 2-byte inner
    // ethertype; built as raw bytes since `Vlan` has no public constructor outside `Parse`.
    fn vlan_tag(inner_ethtype: EthType) -> [u8; 4] {
        let raw = inner_ethtype.raw().to_be_bytes();
        [0x00, 0x0A, raw[0], raw[1]]
    }

    fn eth_header(ether_type: EthType) -> Vec<u8> {
        let eth = Eth::new(
            SourceMac::new(Mac([0x02, 0, 0, 0, 0, 1])).unwrap(),
            DestinationMac::new(Mac([0x02, 0, 0, 0, 0, 2])).unwrap(),
            ether_type,
        );
        let mut buf = [0u8; Eth::HEADER_LEN];
        eth.deparse(&mut buf).unwrap();
        buf.to_vec()
    }

    fn ipv4_header(protocol: etherparse::IpNumber, payload_len: u16, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        etherparse::Ipv4Header::new(payload_len, 64, protocol, src, dst)
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    fn tcp_frame(src_ip: [u8; 4], src_port: u16, dst_ip: [u8; 4], dst_port: u16, flags: &[&str]) -> Vec<u8> {
        let mut tcp = Tcp::new(
            TcpPort::new_checked(src_port).unwrap(),
            TcpPort::new_checked(dst_port).unwrap(),
        );
        for flag in flags {
            match *flag {
                "syn" => tcp.set_syn(true),
                "ack" => tcp.set_ack(true),
                "fin" => tcp.set_fin(true),
                "rst" => tcp.set_rst(true),
                _ => unreachable!("unknown flag in test fixture"),
            };
        }
        let mut tcp_buf = [0u8; Tcp::MIN_LENGTH];
        tcp.deparse(&mut tcp_buf).unwrap();

        let mut frame = eth_header(EthType::IPV4);
        frame.extend_from_slice(&ipv4_header(
            etherparse::IpNumber::TCP,
            Tcp::MIN_LENGTH as u16,
            src_ip,
            dst_ip,
        ));
        frame.extend_from_slice(&tcp_buf);
        frame
    }

    fn udp_frame(src_ip: [u8; 4], src_port: u16, dst_ip: [u8; 4], dst_port: u16) -> Vec<u8> {
        let udp = Udp::new(
            UdpPort::new_checked(src_port).unwrap(),
            UdpPort::new_checked(dst_port).unwrap(),
        );
        let mut udp_buf = [0u8; Udp::LEN];
        udp.deparse(&mut udp_buf).unwrap();

        let mut frame = eth_header(EthType::IPV4);
        frame.extend_from_slice(&ipv4_header(
            etherparse::IpNumber::UDP,
            Udp::LEN as u16,
            src_ip,
            dst_ip,
        ));
        frame.extend_from_slice(&udp_buf);
        frame
    }

    #[test]
    fn tcp_handshake_transitions_through_lifecycle() {
        let mut table = FlowTable::new(TableConfig::default());
        let syn = tcp_frame([10, 0, 0, 1], 40000, [10, 0, 0, 2], 80, &["syn"]);
        let syn_ack = tcp_frame([10, 0, 0, 2], 80, [10, 0, 0, 1], 40000, &["syn", "ack"]);
        let fin_ack = tcp_frame([10, 0, 0, 1], 40000, [10, 0, 0, 2], 80, &["fin", "ack"]);

        let (flow, _) = table.get_full(&syn, Some(0), true, true).unwrap();
        assert_eq!(flow.state(), FlowState::New);

        let (flow, _) = table.get_full(&syn_ack, Some(1), true, true).unwrap();
        assert_eq!(flow.state(), FlowState::Open);

        let (flow, _) = table.get_full(&fin_ack, Some(2), true, true).unwrap();
        assert_eq!(flow.state(), FlowState::Closed);
        assert_eq!(flow.packets(), 3);
        assert_eq!(flow.lower_port(), 80);
        assert_eq!(flow.upper_port(), 40000);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn udp_bidirectional_opens_after_reply() {
        let mut table = FlowTable::new(TableConfig::default());
        let request = udp_frame([192, 168, 1, 5], 53, [192, 168, 1, 9], 44444);
        let reply = udp_frame([192, 168, 1, 9], 44444, [192, 168, 1, 5], 53);

        let (flow, _) = table.get_full(&request, Some(0), true, true).unwrap();
        assert_eq!(flow.state(), FlowState::New);

        let (flow, _) = table.get_full(&reply, Some(1), true, true).unwrap();
        assert_eq!(flow.state(), FlowState::Open);
        assert_eq!(flow.lifetime_secs(), 300);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn vlan_in_vlan_parses_like_untagged_traffic() {
        let mut table = FlowTable::new(TableConfig::default());

        let mut frame = eth_header(EthType::VLAN_QINQ);
        frame.extend_from_slice(&vlan_tag(EthType::VLAN));
        frame.extend_from_slice(&vlan_tag(EthType::IPV4));

        frame.extend_from_slice(&ipv4_header(
            etherparse::IpNumber::TCP,
            Tcp::MIN_LENGTH as u16,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
        ));
        let tcp = Tcp::new(
            TcpPort::new_checked(40000).unwrap(),
            TcpPort::new_checked(80).unwrap(),
        );
        let mut tcp_buf = [0u8; Tcp::MIN_LENGTH];
        tcp.deparse(&mut tcp_buf).unwrap();
        frame.extend_from_slice(&tcp_buf);

        let (flow, _) = table.get_full(&frame, Some(0), true, true).unwrap();
        assert_eq!(flow.lower_port(), 80);

        // a third tag is a decode failure, so no flow is recorded
        let mut triple = eth_header(EthType::VLAN_QINQ);
        for _ in 0..3 {
            triple.extend_from_slice(&vlan_tag(EthType::VLAN));
        }
        assert!(table.get_full(&triple, Some(0), true, true).is_none());
    }

    #[test]
    fn capacity_rejects_third_distinct_session() {
        let mut table = FlowTable::new(TableConfig::default());
        table.set_max(2);

        let a = udp_frame([10, 0, 0, 1], 1000, [10, 0, 0, 2], 2000);
        let b = udp_frame([10, 0, 0, 3], 1000, [10, 0, 0, 4], 2000);
        let c = udp_frame([10, 0, 0, 5], 1000, [10, 0, 0, 6], 2000);

        assert!(table.get_full(&a, Some(0), true, true).is_some());
        assert!(table.get_full(&b, Some(0), true, true).is_some());
        assert!(table.get_full(&c, Some(0), true, true).is_none());

        assert_eq!(table.size(), 2);
        assert_eq!(table.misses(), 2);
        assert_eq!(table.hits(), 0);

        assert!(table.get_full(&a, Some(1), true, true).is_some());
        assert_eq!(table.hits(), 1);
    }

    #[test]
    fn expire_returns_oldest_due_flow_first() {
        let mut table = FlowTable::new(TableConfig::default());
        let a = udp_frame([10, 0, 0, 1], 1000, [10, 0, 0, 2], 2000);
        let b = udp_frame([10, 0, 0, 3], 1000, [10, 0, 0, 4], 2000);

        table.get_full(&a, Some(0), true, true).unwrap();
        table.get_full(&b, Some(1_000_000), true, true).unwrap();

        // both flows are NEW with a 30s timeout; at t=31s only the first is due
        let expired = table.expire(31_000_000).unwrap();
        assert_eq!(expired.lower_ip(), std::net::IpAddr::from([10, 0, 0, 1]));
        assert_eq!(table.size(), 1);

        assert!(table.expire(31_000_000).is_none());
        let expired = table.expire(32_000_000).unwrap();
        assert_eq!(expired.lower_ip(), std::net::IpAddr::from([10, 0, 0, 3]));
        assert_eq!(table.size(), 0);
    }

    #[test]
    #[traced_test]
    fn insert_and_capacity_reject_are_logged() {
        let mut table = FlowTable::new(TableConfig::default());
        table.set_max(1);

        let a = udp_frame([10, 0, 0, 1], 1000, [10, 0, 0, 2], 2000);
        let b = udp_frame([10, 0, 0, 3], 1000, [10, 0, 0, 4], 2000);

        table.get_full(&a, Some(0), true, true).unwrap();
        assert!(table.get_full(&b, Some(0), true, true).is_none());

        assert!(logs_contain("miss, inserted new flow"));
        assert!(logs_contain("miss rejected"));
    }

    #[test]
    fn foreach_visits_every_flow_exactly_once() {
        let mut table = FlowTable::new(TableConfig::default());
        table
            .get_full(&udp_frame([10, 0, 0, 1], 1, [10, 0, 0, 2], 2), Some(0), true, true)
            .unwrap();
        table
            .get_full(&udp_frame([10, 0, 0, 3], 1, [10, 0, 0, 4], 2), Some(0), true, true)
            .unwrap();

        let mut seen = 0;
        table.foreach(|_flow| seen += 1);
        assert_eq!(seen, 2);
    }
}
