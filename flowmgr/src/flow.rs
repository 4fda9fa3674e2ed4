// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-flow record and its lifecycle state.

use crate::tuple::{Endpoint, Tuple};
use std::any::Any;
use std::net::IpAddr;

/// A flow's lifecycle state.
///
/// Transitions are driven entirely by [`crate::state_machine`]; nothing outside it should
/// construct or compare against a specific variant except to read it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowState {
    /// Freshly created, or a non-TCP/UDP protocol that never leaves this state.
    New,
    /// A TCP three-way handshake completed, or a UDP reply was observed.
    Open,
    /// A TCP connection was torn down (FIN+ACK or RST observed).
    Closed,
}

/// A single bidirectional flow tracked by a [`crate::table::FlowTable`].
///
/// Owned entirely by the table that created it: a `Flow` is only ever observed by reference,
/// through [`crate::table::FlowTable::get_full`] or a [`crate::table::FlowTable::foreach`]
/// callback, and that reference is valid only until the table's next mutating operation.
#[derive(Debug)]
pub struct Flow {
    tuple: Tuple,
    state: FlowState,
    lifetime_secs: u64,
    last_seen_us: u64,
    packets: u64,
    flags: u16,
    /// `true` if the packet that created this flow was sent by [`Tuple::lower`].
    from_lower: bool,
    user_context: Option<Box<dyn Any + Send>>,
}

impl Flow {
    pub(crate) fn new(tuple: Tuple, from_lower: bool, lifetime_secs: u64, now_us: u64) -> Flow {
        Flow {
            tuple,
            state: FlowState::New,
            lifetime_secs,
            last_seen_us: now_us,
            packets: 1,
            flags: 0,
            from_lower,
            user_context: None,
        }
    }

    /// The flow's canonical identity.
    #[must_use]
    pub fn tuple(&self) -> Tuple {
        self.tuple
    }

    /// The flow's lifecycle state.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Number of packets observed on this flow (both directions).
    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// The current lifetime bucket, in seconds, governing when this flow becomes eligible for
    /// expiry if untouched.
    #[must_use]
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Microsecond timestamp of the last packet that touched this flow.
    #[must_use]
    pub fn last_seen_us(&self) -> u64 {
        self.last_seen_us
    }

    /// The most recent TCP flags word observed on this flow (`0` for non-TCP flows or before any
    /// packet has been observed).
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// The IP protocol number for this flow.
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.tuple.protocol()
    }

    /// The memoised hash of this flow's canonical tuple.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.tuple.hash()
    }

    /// The endpoint with the numerically smaller port.
    #[must_use]
    pub fn lower(&self) -> Endpoint {
        self.tuple.lower()
    }

    /// The endpoint with the numerically larger port (ties go to `lower`).
    #[must_use]
    pub fn upper(&self) -> Endpoint {
        self.tuple.upper()
    }

    /// Convenience: [`Flow::lower`]'s port.
    #[must_use]
    pub fn lower_port(&self) -> u16 {
        self.lower().port
    }

    /// Convenience: [`Flow::upper`]'s port.
    #[must_use]
    pub fn upper_port(&self) -> u16 {
        self.upper().port
    }

    /// Convenience: [`Flow::lower`]'s address.
    #[must_use]
    pub fn lower_ip(&self) -> IpAddr {
        self.lower().address
    }

    /// Convenience: [`Flow::upper`]'s address.
    #[must_use]
    pub fn upper_ip(&self) -> IpAddr {
        self.upper().address
    }

    /// The "server" side of the flow: the endpoint with the numerically smaller port, fixed for
    /// the life of the flow (convenience alias for [`Flow::lower_port`]).
    #[must_use]
    pub fn server_port(&self) -> u16 {
        self.lower_port()
    }

    /// The "server" side's address (convenience alias for [`Flow::lower_ip`]).
    #[must_use]
    pub fn server_ip(&self) -> IpAddr {
        self.lower_ip()
    }

    /// Caller-owned opaque annotation. Never inspected by the core.
    #[must_use]
    pub fn user_context(&self) -> Option<&(dyn Any + Send)> {
        self.user_context.as_deref()
    }

    /// Mutable access to the caller-owned annotation.
    pub fn user_context_mut(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.user_context.as_deref_mut()
    }

    /// Replace the caller-owned annotation, returning the previous one.
    pub fn set_user_context(
        &mut self,
        context: Option<Box<dyn Any + Send>>,
    ) -> Option<Box<dyn Any + Send>> {
        std::mem::replace(&mut self.user_context, context)
    }

    /// True if the packet that created this flow was sent from [`Tuple::lower`].
    #[must_use]
    pub(crate) fn from_lower(&self) -> bool {
        self.from_lower
    }

    pub(crate) fn set_state(&mut self, state: FlowState) {
        self.state = state;
    }

    pub(crate) fn set_lifetime_secs(&mut self, lifetime_secs: u64) {
        self.lifetime_secs = lifetime_secs;
    }

    pub(crate) fn touch(&mut self, now_us: u64, flags: Option<u16>) {
        self.last_seen_us = now_us;
        if let Some(flags) = flags {
            self.flags = flags;
        }
        self.packets += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tuple::Endpoint;

    fn tuple() -> Tuple {
        Tuple::new(
            6,
            Endpoint::new(IpAddr::from([10, 0, 0, 1]), 40000),
            Endpoint::new(IpAddr::from([10, 0, 0, 2]), 80),
        )
    }

    #[test]
    fn new_flow_starts_in_new_state_with_one_packet() {
        let flow = Flow::new(tuple(), true, 30, 0);
        assert_eq!(flow.state(), FlowState::New);
        assert_eq!(flow.packets(), 1);
        assert_eq!(flow.lower_port(), 80);
        assert_eq!(flow.upper_port(), 40000);
        assert_eq!(flow.server_port(), 80);
    }

    #[test]
    fn touch_advances_counters_without_changing_state() {
        let mut flow = Flow::new(tuple(), true, 30, 0);
        flow.touch(1_000_000, Some(0x12));
        assert_eq!(flow.packets(), 2);
        assert_eq!(flow.last_seen_us(), 1_000_000);
        assert_eq!(flow.flags(), 0x12);
        assert_eq!(flow.state(), FlowState::New);
    }

    #[test]
    fn touch_without_flags_preserves_previous_flags() {
        let mut flow = Flow::new(tuple(), true, 30, 0);
        flow.touch(1_000_000, Some(0x12));
        flow.touch(2_000_000, None);
        assert_eq!(flow.flags(), 0x12);
        assert_eq!(flow.packets(), 3);
    }

    #[test]
    fn user_context_round_trips() {
        let mut flow = Flow::new(tuple(), true, 30, 0);
        assert!(flow.user_context().is_none());
        flow.set_user_context(Some(Box::new(42u32)));
        assert_eq!(
            flow.user_context().and_then(|c| c.downcast_ref::<u32>()),
            Some(&42)
        );
    }
}
