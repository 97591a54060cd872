//! Low-level little-endian byte-swap primitives.
//!
//! [`host`](super::host) performs these conversions implicitly through typed
//! `bytes::Buf` reads/writes, which is the idiomatic way to do it and avoids
//! hand-rolled bit-twiddling in the hot path. This module exists to state
//! the swap rules explicitly and to let property tests verify the
//! involution law from spec §8 ("applying the ingress swap twice yields the
//! input") independent of any particular message shape.

/// Byte-swap every 4-byte word of `buf` in place. `buf.len()` must be a
/// multiple of 4.
pub fn swap_u32_words_in_place(buf: &mut [u8]) {
    debug_assert_eq!(buf.len() % 4, 0);
    for word in buf.chunks_exact_mut(4) {
        word.swap(0, 3);
        word.swap(1, 2);
    }
}

/// Byte-swap a single 4-byte field at `offset`.
pub fn swap_u32_at(buf: &mut [u8], offset: usize) {
    swap_u32_words_in_place(&mut buf[offset..offset + 4]);
}

/// Byte-swap a single 8-byte field at `offset`.
pub fn swap_u64_at(buf: &mut [u8], offset: usize) {
    let field = &mut buf[offset..offset + 8];
    field.swap(0, 7);
    field.swap(1, 6);
    field.swap(2, 5);
    field.swap(3, 4);
}

/// Byte-swap every 2-byte word from `offset` to the end of `buf` in place.
/// `(buf.len() - offset)` must be a multiple of 2.
pub fn swap_u16_words_from(buf: &mut [u8], offset: usize) {
    let tail = &mut buf[offset..];
    debug_assert_eq!(tail.len() % 2, 0);
    for word in tail.chunks_exact_mut(2) {
        word.swap(0, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn u32_swap_is_involution(mut data in proptest::collection::vec(any::<u8>(), 0..64usize).prop_map(|mut v| { v.truncate(v.len() - v.len() % 4); v })) {
            let original = data.clone();
            swap_u32_words_in_place(&mut data);
            swap_u32_words_in_place(&mut data);
            prop_assert_eq!(data, original);
        }

        #[test]
        fn u16_swap_is_involution(mut data in proptest::collection::vec(any::<u8>(), 0..64usize).prop_map(|mut v| { v.truncate(v.len() - v.len() % 2); v })) {
            let original = data.clone();
            swap_u16_words_from(&mut data, 0);
            swap_u16_words_from(&mut data, 0);
            prop_assert_eq!(data, original);
        }
    }

    #[test]
    fn u64_swap_is_involution() {
        let mut buf = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let original = buf;
        swap_u64_at(&mut buf, 0);
        assert_ne!(buf, original);
        swap_u64_at(&mut buf, 0);
        assert_eq!(buf, original);
    }
}
