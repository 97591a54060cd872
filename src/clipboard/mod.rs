//! Clipboard ownership tracking and host/agent message translation
//! (spec §3 `Clipboard-ownership vector`, §4.3/§4.4 clipboard routing).

pub mod error;

pub use error::ClipboardError;

/// Selection index for the guest's "primary" (X11 `PRIMARY`) buffer.
pub const SELECTION_PRIMARY: u8 = 0;
/// Selection index for the guest's "clipboard" (X11 `CLIPBOARD`) buffer.
pub const SELECTION_CLIPBOARD: u8 = 1;
/// Selection index for the guest's "secondary" (X11 `SECONDARY`) buffer.
pub const SELECTION_SECONDARY: u8 = 2;

const SELECTION_COUNT: usize = 3;

/// True at index `sel` means "the guest agent currently owns that selection
/// and the host may expect us to supply data" (spec §3). Reset to all-false
/// on every active-agent change (invariant I5).
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipVector([bool; SELECTION_COUNT]);

impl OwnershipVector {
    pub fn new() -> Self {
        Self([false; SELECTION_COUNT])
    }

    pub fn grant(&mut self, selection: u8) {
        if let Some(slot) = self.0.get_mut(selection as usize) {
            *slot = true;
        }
    }

    pub fn revoke(&mut self, selection: u8) {
        if let Some(slot) = self.0.get_mut(selection as usize) {
            *slot = false;
        }
    }

    pub fn owns(&self, selection: u8) -> bool {
        self.0.get(selection as usize).copied().unwrap_or(false)
    }

    /// Selections to emit `CLIPBOARD_RELEASE` for on an active-agent
    /// transition. The original daemon's release loop iterates
    /// `sel < SECONDARY` — never releasing the secondary selection — which
    /// spec.md §9 flags as a likely bug but asks us to preserve pending a
    /// protocol clarification (Open Question 1). [`clear_all`](Self::clear_all)
    /// still resets every selection including secondary, satisfying
    /// invariant I5 in full; only the upstream broadcast is narrowed.
    pub fn owned_for_release(&self) -> Vec<u8> {
        self.0
            .iter()
            .enumerate()
            .take(SELECTION_SECONDARY as usize)
            .filter(|(_, owned)| **owned)
            .map(|(i, _)| i as u8)
            .collect()
    }

    pub fn clear_all(&mut self) {
        self.0 = [false; SELECTION_COUNT];
    }
}

/// The egress payload cap last announced via `MAX_CLIPBOARD` (spec §4.3).
/// `None` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxClipboard(Option<usize>);

impl MaxClipboard {
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub fn set(&mut self, max_bytes: i32) {
        self.0 = if max_bytes < 0 {
            None
        } else {
            Some(max_bytes as usize)
        };
    }

    /// Does `len` exceed the cap (spec §7, "too-large clipboard payload")?
    pub fn exceeds(&self, len: usize) -> bool {
        self.0.is_some_and(|max| len > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_excludes_secondary_but_clear_resets_it() {
        let mut vector = OwnershipVector::new();
        vector.grant(SELECTION_PRIMARY);
        vector.grant(SELECTION_CLIPBOARD);
        vector.grant(SELECTION_SECONDARY);

        let released = vector.owned_for_release();
        assert_eq!(released, vec![SELECTION_PRIMARY, SELECTION_CLIPBOARD]);
        assert!(vector.owns(SELECTION_SECONDARY));

        vector.clear_all();
        assert!(!vector.owns(SELECTION_SECONDARY));
        assert!(!vector.owns(SELECTION_PRIMARY));
    }

    #[test]
    fn grab_then_release_round_trips() {
        let mut vector = OwnershipVector::new();
        assert!(!vector.owns(SELECTION_CLIPBOARD));
        vector.grant(SELECTION_CLIPBOARD);
        assert!(vector.owns(SELECTION_CLIPBOARD));
        vector.revoke(SELECTION_CLIPBOARD);
        assert!(!vector.owns(SELECTION_CLIPBOARD));
    }

    #[test]
    fn max_clipboard_unbounded_by_default() {
        let cap = MaxClipboard::unbounded();
        assert!(!cap.exceeds(usize::MAX / 2));
    }

    #[test]
    fn max_clipboard_rejects_oversized_payload() {
        let mut cap = MaxClipboard::unbounded();
        cap.set(16);
        assert!(cap.exceeds(17));
        assert!(!cap.exceeds(16));
    }
}
