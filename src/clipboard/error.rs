//! Clipboard-bridge error types.
//!
//! Scoped down from the richer recovery-strategy machinery this crate's
//! teacher uses for a desktop-facing clipboard manager: the daemon's
//! clipboard bridge has exactly two failure modes worth naming, and both
//! have a fixed, spec-mandated response rather than a retry policy (spec §7).

use thiserror::Error;

/// Errors surfaced while translating a clipboard message between the host
/// and agent wire formats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    /// The clipboard message named a selection index outside the
    /// negotiated range.
    #[error("invalid selection index {0}")]
    InvalidSelection(u8),

    /// An agent sent a clipboard message while it was not the active agent,
    /// or without the host having negotiated `CLIPBOARD_BY_DEMAND`.
    #[error("clipboard message from non-active or unnegotiated agent")]
    NotAuthorized,
}
