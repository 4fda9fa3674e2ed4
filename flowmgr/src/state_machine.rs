// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-packet lifecycle transitions for a [`Flow`](crate::flow::Flow).
//!
//! Applied once when a flow is created (against the packet that created it) and again on every
//! subsequent packet that hits it via [`crate::table::FlowTable::get_full`] with `update: true`.

use crate::decode::tcp_flag;
use crate::flow::{Flow, FlowState};
use crate::table::TableConfig;

const TCP: u8 = 6;
const UDP: u8 = 17;

/// Apply the lifecycle rules for one observed packet to `flow`.
///
/// `from_lower` is whether this packet was sent by [`crate::tuple::Tuple::lower`] (as opposed to
/// [`crate::tuple::Tuple::upper`]); it is how UDP reply detection works.
pub fn apply(flow: &mut Flow, tcp_flags: Option<u16>, from_lower: bool, config: &TableConfig) {
    match flow.protocol() {
        TCP => apply_tcp(flow, tcp_flags.unwrap_or(0), config),
        UDP => apply_udp(flow, from_lower, config),
        _ => {}
    }
}

fn apply_tcp(flow: &mut Flow, flags: u16, config: &TableConfig) {
    let fin_ack = flags & (tcp_flag::FIN | tcp_flag::ACK) == (tcp_flag::FIN | tcp_flag::ACK);
    let syn_ack = flags & (tcp_flag::SYN | tcp_flag::ACK) == (tcp_flag::SYN | tcp_flag::ACK);
    let syn = flags & tcp_flag::SYN != 0;
    let rst = flags & tcp_flag::RST != 0;

    if fin_ack {
        flow.set_state(FlowState::Closed);
        flow.set_lifetime_secs(config.closed_timeout_secs);
    } else if syn_ack {
        flow.set_state(FlowState::Open);
        flow.set_lifetime_secs(config.open_timeout_secs);
    } else if syn {
        flow.set_state(FlowState::New);
        flow.set_lifetime_secs(config.new_timeout_secs);
    } else if rst {
        flow.set_state(FlowState::Closed);
        flow.set_lifetime_secs(config.closed_timeout_secs);
    }
}

fn apply_udp(flow: &mut Flow, from_lower: bool, config: &TableConfig) {
    if from_lower != flow.from_lower() {
        flow.set_state(FlowState::Open);
        flow.set_lifetime_secs(config.open_timeout_secs);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tuple::{Endpoint, Tuple};
    use std::net::IpAddr;

    fn tcp_tuple() -> Tuple {
        Tuple::new(
            6,
            Endpoint::new(IpAddr::from([10, 0, 0, 1]), 40000),
            Endpoint::new(IpAddr::from([10, 0, 0, 2]), 80),
        )
    }

    fn udp_tuple() -> Tuple {
        Tuple::new(
            17,
            Endpoint::new(IpAddr::from([192, 168, 1, 5]), 53),
            Endpoint::new(IpAddr::from([192, 168, 1, 9]), 44444),
        )
    }

    #[test]
    fn tcp_handshake_transitions_new_open_closed() {
        let config = TableConfig::default();
        let mut flow = Flow::new(tcp_tuple(), false, config.new_timeout_secs, 0);
        apply(&mut flow, Some(tcp_flag::SYN), false, &config);
        assert_eq!(flow.state(), FlowState::New);

        apply(
            &mut flow,
            Some(tcp_flag::SYN | tcp_flag::ACK),
            true,
            &config,
        );
        assert_eq!(flow.state(), FlowState::Open);
        assert_eq!(flow.lifetime_secs(), config.open_timeout_secs);

        apply(
            &mut flow,
            Some(tcp_flag::FIN | tcp_flag::ACK),
            false,
            &config,
        );
        assert_eq!(flow.state(), FlowState::Closed);
        assert_eq!(flow.lifetime_secs(), config.closed_timeout_secs);
    }

    #[test]
    fn tcp_rst_closes_regardless_of_prior_state() {
        let config = TableConfig::default();
        let mut flow = Flow::new(tcp_tuple(), false, config.new_timeout_secs, 0);
        apply(&mut flow, Some(tcp_flag::RST), false, &config);
        assert_eq!(flow.state(), FlowState::Closed);
    }

    #[test]
    fn udp_opens_on_reply_and_stays_open_after() {
        let config = TableConfig::default();
        // created by the lower endpoint (192.168.1.5:53)
        let mut flow = Flow::new(udp_tuple(), true, config.new_timeout_secs, 0);
        assert_eq!(flow.state(), FlowState::New);

        // reply from the upper endpoint
        apply(&mut flow, None, false, &config);
        assert_eq!(flow.state(), FlowState::Open);
        assert_eq!(flow.lifetime_secs(), config.open_timeout_secs);

        // further packets from either side don't regress the state
        apply(&mut flow, None, true, &config);
        assert_eq!(flow.state(), FlowState::Open);
    }

    #[test]
    fn other_protocols_never_transition() {
        let config = TableConfig::default();
        let tuple = Tuple::new(
            47,
            Endpoint::new(IpAddr::from([10, 0, 0, 1]), 0),
            Endpoint::new(IpAddr::from([10, 0, 0, 2]), 0),
        );
        let mut flow = Flow::new(tuple, true, config.new_timeout_secs, 0);
        apply(&mut flow, None, false, &config);
        assert_eq!(flow.state(), FlowState::New);
        assert_eq!(flow.lifetime_secs(), config.new_timeout_secs);
    }
}
