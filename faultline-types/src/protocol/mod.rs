//! This module exposes the types for the faultline protocol in different
//! versions.

#[cfg(feature = "protocol")]
mod attachment;
#[cfg(feature = "protocol")]
mod envelope;
#[cfg(feature = "protocol")]
mod session;
#[cfg(feature = "protocol")]
pub mod v1;

/// The latest version of the protocol.
pub const LATEST: u16 = 1;

/// The always latest faultline protocol version.
#[cfg(feature = "protocol")]
pub mod latest {
    pub use super::v1::*;
}
