//! Negotiated capability bitset.
//!
//! Sized dynamically by whatever `ANNOUNCE_CAPABILITIES` message last arrived
//! from the host: the bitset is replaced wholesale rather than merged, per
//! the data model (`Capability set`, spec §3). [`Capability`] enumerates the
//! bits this daemon understands; [`CapabilitySet::ours`] is what this daemon
//! advertises back to the host.

/// A single negotiable protocol feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Capability {
    MouseState = 0,
    MonitorsConfig = 1,
    Reply = 2,
    ClipboardByDemand = 3,
    ClipboardSelection = 4,
    SparseMonitorsConfig = 5,
    GuestLineEndLf = 6,
    MaxClipboard = 7,
    AudioVolumeSync = 8,
}

/// A bitset of negotiated capabilities, as wide as the last
/// `ANNOUNCE_CAPABILITIES` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    words: Vec<u32>,
}

impl CapabilitySet {
    /// An empty set (as if no capabilities had ever been announced).
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    /// Build from the raw little-endian-already-swapped words of an
    /// `ANNOUNCE_CAPABILITIES` payload.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// The set this daemon advertises to the host: the minimum feature list
    /// required by §4.2.
    pub fn ours() -> Self {
        let mut set = Self {
            words: vec![0u32; 1],
        };
        for cap in [
            Capability::MouseState,
            Capability::MonitorsConfig,
            Capability::Reply,
            Capability::ClipboardByDemand,
            Capability::ClipboardSelection,
            Capability::SparseMonitorsConfig,
            Capability::GuestLineEndLf,
            Capability::MaxClipboard,
            Capability::AudioVolumeSync,
        ] {
            set.set(cap);
        }
        set
    }

    fn set(&mut self, cap: Capability) {
        let bit = cap as u32;
        let word = (bit / 32) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 32);
    }

    /// Is `cap` present in this set?
    pub fn has(&self, cap: Capability) -> bool {
        let bit = cap as u32;
        let word = (bit / 32) as usize;
        self.words
            .get(word)
            .map(|w| w & (1 << (bit % 32)) != 0)
            .unwrap_or(false)
    }

    /// The raw words, ready for LE-swap-on-egress.
    pub fn as_words(&self) -> &[u32] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ours_contains_required_features() {
        let ours = CapabilitySet::ours();
        assert!(ours.has(Capability::MouseState));
        assert!(ours.has(Capability::ClipboardSelection));
        assert!(ours.has(Capability::AudioVolumeSync));
    }

    #[test]
    fn empty_has_nothing() {
        let empty = CapabilitySet::empty();
        assert!(!empty.has(Capability::MouseState));
    }

    #[test]
    fn from_words_round_trips_bits() {
        let set = CapabilitySet::from_words(vec![1 << 4]);
        assert!(set.has(Capability::ClipboardSelection));
        assert!(!set.has(Capability::MouseState));
    }

    #[test]
    fn set_grows_words_as_needed() {
        let mut set = CapabilitySet::empty();
        set.set(Capability::AudioVolumeSync);
        assert!(set.has(Capability::AudioVolumeSync));
        assert_eq!(set.words.len(), 1);
    }
}
