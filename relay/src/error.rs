//! Protocol Error Taxonomy
//!
//! Every error here is reported back to the originating connection as a
//! single `error` signal. None of them are fatal to the process or the
//! connection; processing of the offending packet simply stops.

use thiserror::Error;

/// Structural errors detected by the channel handlers themselves, before or
/// alongside schema validation. The display strings are part of the wire
/// contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// An `authorize` packet arrived without a usable `token`.
    #[error("No token provided")]
    MissingToken,

    /// A consumer action arrived with no packet at all.
    #[error("No packet provided")]
    MissingPacket,

    /// A consumer action did not name a target provider.
    #[error("No provider specified")]
    MissingProvider,

    /// A `getState` request did not say which subtypes it wants.
    #[error("No subtypes provided")]
    MissingSubtypes,

    /// Neither filter field of a `setFilter` request was an array.
    #[error("Invalid `filter`")]
    InvalidFilter,
}
