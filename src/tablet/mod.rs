//! The tablet device: a synthetic absolute-positioning pointer injected
//! into the guest kernel, parameterized by (width, height, screen list) and
//! kept in lockstep with the host channel by the coupler (spec §3 `Tablet
//! device`, §4.5 coupler).
//!
//! The uinput driver layer is treated by spec.md as an opaque sink — out of
//! scope for the daemon's core logic — so [`TabletSink`] is the seam: the
//! coupler only ever calls `open`/`resize`/`send_mouse_state`/`close`, never
//! touching `/dev/uinput` directly. [`uinput`] provides the real Linux
//! backend; [`FakeTablet`] backs the `-f` CLI flag and tests.

pub mod error;
#[cfg(feature = "uinput")]
pub mod uinput;

pub use error::TabletError;

use crate::protocol::agent::ScreenRect;

/// Accepts mouse states and resize commands for a synthetic pointing
/// device. Implementors own at most one open device at a time.
pub trait TabletSink: Send {
    /// Create the device, or resize it if already open, to match
    /// `(width, height, screens)`.
    fn open_or_resize(&mut self, width: u32, height: u32, screens: &[ScreenRect]) -> Result<(), TabletError>;

    /// Inject a native-order mouse state.
    fn send_mouse_state(&mut self, x: i32, y: i32, buttons: u32, display_id: u32) -> Result<(), TabletError>;

    /// Destroy the device, if open. A no-op if already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Logs what would have happened instead of issuing ioctls; used for the
/// `-f` (fake uinput) flag and in unit tests.
#[derive(Debug, Default)]
pub struct FakeTablet {
    open: bool,
    width: u32,
    height: u32,
}

impl TabletSink for FakeTablet {
    fn open_or_resize(&mut self, width: u32, height: u32, _screens: &[ScreenRect]) -> Result<(), TabletError> {
        self.open = true;
        self.width = width;
        self.height = height;
        tracing::debug!(width, height, "fake tablet open/resize");
        Ok(())
    }

    fn send_mouse_state(&mut self, x: i32, y: i32, buttons: u32, display_id: u32) -> Result<(), TabletError> {
        tracing::trace!(x, y, buttons, display_id, "fake tablet mouse state");
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_tablet_tracks_open_state() {
        let mut tablet = FakeTablet::default();
        assert!(!tablet.is_open());
        tablet.open_or_resize(1024, 768, &[]).unwrap();
        assert!(tablet.is_open());
        tablet.close();
        assert!(!tablet.is_open());
    }
}
