//! Protocol-level error types.

use thiserror::Error;

/// Result type for wire-codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while validating or translating wire messages.
///
/// None of these are raised as control-flow exceptions inside the event
/// loop; handlers match on them and decide whether to drop a message, tear
/// down a connection, or reply with an error status, per the daemon's error
/// handling design.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header `protocol` field did not match the negotiated constant.
    #[error("unsupported protocol version: {0}")]
    BadVersion(u32),

    /// Header `type` field was zero or beyond the known-type table.
    #[error("unknown message type: {0}")]
    UnknownType(u32),

    /// Payload was smaller than the type's minimum (or, for fixed-shape
    /// types, not exactly equal to it).
    #[error("payload size {got} too small for type {message_type} (need {need})")]
    PayloadTooSmall {
        /// Numeric wire type.
        message_type: u32,
        /// Bytes actually present.
        got: usize,
        /// Bytes required.
        need: usize,
    },

    /// Payload size was not an exact match for a fixed-shape message type.
    #[error("payload size {got} does not match fixed size {want} for type {message_type}")]
    PayloadSizeMismatch {
        /// Numeric wire type.
        message_type: u32,
        /// Bytes actually present.
        got: usize,
        /// Bytes required.
        want: usize,
    },

    /// Payload size was not an integer multiple of the per-entry size
    /// (e.g. the per-screen entry array in a resolution message).
    #[error("payload size {got} is not a multiple of entry size {entry}")]
    NotEntryMultiple {
        /// Bytes actually present.
        got: usize,
        /// Entry size that must divide `got`.
        entry: usize,
    },

    /// A selection index outside the negotiated range.
    #[error("invalid clipboard selection index: {0}")]
    BadSelection(u8),
}
