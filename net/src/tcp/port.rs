// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! TCP port type.

use std::num::NonZero;

/// Transparent wrapper type for TCP ports.
#[repr(transparent)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct TcpPort(NonZero<u16>);

/// Errors which may occur in the creation or parsing of a [`TcpPort`].
#[repr(transparent)]
#[derive(Debug, thiserror::Error, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum TcpPortError {
    /// The spec reserves zero to mean "any port." It isn't valid in the context of a packet.
    #[error("port must be non-zero")]
    Zero,
}

impl TcpPort {
    /// Create a [`TcpPort`] from a non-zero value.
    #[must_use]
    pub const fn new(port: NonZero<u16>) -> TcpPort {
        TcpPort(port)
    }

    /// Create a [`TcpPort`].
    ///
    /// # Errors
    ///
    /// Will return an error if the submitted raw port number is zero.
    pub const fn new_checked(port: u16) -> Result<TcpPort, TcpPortError> {
        match NonZero::new(port) {
            None => Err(TcpPortError::Zero),
            Some(port) => Ok(TcpPort(port)),
        }
    }

    /// The raw `u16` value of this port.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0.get()
    }
}

impl From<TcpPort> for u16 {
    fn from(port: TcpPort) -> Self {
        port.0.get()
    }
}

impl TryFrom<u16> for TcpPort {
    type Error = TcpPortError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new_checked(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(TcpPort::new_checked(0), Err(TcpPortError::Zero));
    }

    #[test]
    fn nonzero_round_trips() {
        assert_eq!(TcpPort::new_checked(443).unwrap().value(), 443);
    }
}
