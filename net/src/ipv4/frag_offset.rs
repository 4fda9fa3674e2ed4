// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IP fragmentation offset

use etherparse::IpFragOffset;

/// A 13-bit number which describes the position of the packet payload relative to the
/// original (fragmented) payload, in units of 8 bytes.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FragOffset(pub(crate) IpFragOffset);

/// Errors which can occur when creating a [`FragOffset`]
#[derive(Debug, thiserror::Error)]
pub enum IllegalFragOffset {
    /// Error returned when the value won't fit in a 13-bit field
    #[error("value too large for 13-bit frag-offset: {0:?}")]
    TooBig(u16),
}

impl FragOffset {
    /// The minimum possible [`FragOffset`]
    pub const MIN: FragOffset = FragOffset(IpFragOffset::ZERO);

    /// The maximum possible [`FragOffset`]
    #[allow(unsafe_code)] // trivially safe const-eval
    pub const MAX: FragOffset =
        FragOffset(unsafe { IpFragOffset::new_unchecked(IpFragOffset::MAX_U16) });

    /// Map a raw 16-bit value to a [`FragOffset`]
    ///
    /// # Errors
    ///
    /// Returns an [`IllegalFragOffset`] if the value is not valid (i.e., if the value is larger
    /// than 13-bits)
    pub fn new(raw: u16) -> Result<FragOffset, IllegalFragOffset> {
        Ok(FragOffset(
            IpFragOffset::try_new(raw).map_err(|e| IllegalFragOffset::TooBig(e.actual))?,
        ))
    }

    /// The raw 13-bit value, in units of 8 bytes.
    #[must_use]
    pub fn value(&self) -> u16 {
        self.0.value()
    }
}
