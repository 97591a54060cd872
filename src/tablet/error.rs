//! Tablet-sink error types.

use thiserror::Error;

/// Errors from opening, resizing, or writing to the tablet sink. A tablet
/// open failure while a valid active agent requires the tablet is fatal to
/// the daemon (spec §7); callers decide that policy, this type just reports
/// the failure.
#[derive(Error, Debug)]
pub enum TabletError {
    #[error("failed to open tablet device: {0}")]
    Open(#[source] std::io::Error),

    #[error("ioctl {0} failed: {1}")]
    Ioctl(&'static str, #[source] std::io::Error),

    #[error("failed to write input event: {0}")]
    Write(#[source] std::io::Error),
}
