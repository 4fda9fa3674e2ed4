// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! UDP port type.

use std::num::NonZero;

/// Transparent wrapper type for UDP ports.
#[repr(transparent)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct UdpPort(NonZero<u16>);

/// Errors which may occur in the creation or parsing of a [`UdpPort`].
#[repr(transparent)]
#[derive(Debug, thiserror::Error, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum UdpPortError {
    /// The spec reserves zero to mean "any port." It isn't valid in the context of a packet.
    #[error("port must be non-zero")]
    Zero,
}

impl UdpPort {
    /// Create a [`UdpPort`] from a non-zero value.
    #[must_use]
    pub const fn new(port: NonZero<u16>) -> UdpPort {
        UdpPort(port)
    }

    /// Create a [`UdpPort`].
    ///
    /// # Errors
    ///
    /// Will return an error if the submitted raw port number is zero.
    pub const fn new_checked(port: u16) -> Result<UdpPort, UdpPortError> {
        match NonZero::new(port) {
            None => Err(UdpPortError::Zero),
            Some(port) => Ok(UdpPort(port)),
        }
    }

    /// The raw `u16` value of this port.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0.get()
    }
}

impl From<UdpPort> for u16 {
    fn from(port: UdpPort) -> Self {
        port.0.get()
    }
}

impl TryFrom<u16> for UdpPort {
    type Error = UdpPortError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new_checked(value)
    }
}
