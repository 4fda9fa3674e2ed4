// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![deny(unsafe_code)]

//! A single-threaded IP flow manager: a packet decoder, a direction-independent canonical
//! tuple, a fragment identity cache, and a flow table with lifecycle state tracking.
//!
//! A [`table::FlowTable`] owns everything a caller needs: hand it raw frames through
//! [`table::FlowTable::get_full`] and it decodes, looks up or inserts, and advances the
//! lifecycle state machine in one call. Multiple tables (one per worker thread, typically) don't
//! share any state; there is no locking inside this crate because there is nothing to lock
//! against.
//!
//! ```
//! use flowmgr::table::{FlowTable, TableConfig};
//!
//! let mut table = FlowTable::new(TableConfig::default());
//! // table.get_full(&frame, None, true, true) decodes `frame` and returns the matched flow
//! ```

pub mod decode;
pub mod flow;
pub mod frag_cache;
pub mod state_machine;
pub mod table;
pub mod tuple;

pub use decode::{Decoded, DecodeError};
pub use flow::{Flow, FlowState};
pub use frag_cache::FragmentCache;
pub use table::{FlowTable, InsertError, TableConfig};
pub use tuple::{AddrPair, Endpoint, Tuple};

/// Decode `bytes` into a canonical [`Tuple`] without recording anything in a flow table.
///
/// Useful for callers that only need flow identity (e.g. for sampling or logging) and don't want
/// to pay for a table entry. Fragment identity still requires a [`FragmentCache`]; pass one the
/// caller owns across calls if non-initial fragments need to resolve.
#[must_use]
pub fn parse_only(
    bytes: &[u8],
    start_at_l2: bool,
    frag_cache: &mut FragmentCache,
    now_us: u64,
) -> Option<Tuple> {
    decode::decode(bytes, start_at_l2, frag_cache, now_us)
        .ok()
        .map(|decoded| decoded.tuple)
}
