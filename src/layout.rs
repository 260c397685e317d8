//! `#[repr(C)]` structures that describe the on-media layout of the table.
//!
//! All structs use fixed-size fields and explicit padding so the layout is
//! identical across compilations on the same host. The format is
//! host-endian and is not portable across hosts of differing endianness;
//! this is intentional, not an oversight — abstracting it away would cost
//! the bit-exactness a shared byte region depends on.
//!
//! `KEYMAX`/`VALMAX` are compile-time parameters (const generics on
//! `HashArr`), so a slot's total byte width varies per instantiation and
//! can't be expressed as a single fixed-size `#[repr(C)]` struct on stable
//! Rust. Instead, the fixed 16-byte slot header is a real `#[repr(C)]`
//! struct, and the variable-width payload that follows it is addressed by
//! offset (see `pair_offset`) directly on the slot's raw byte slice.

/// Sentinel value meaning "no next slot" in a value chain `link`.
pub const LINK_NONE: i32 = -1;

/// `count` role discriminators (see `SlotHeader::count`).
pub const COUNT_EMPTY: i16 = 0;
pub const COUNT_COLLIDING: i16 = -1;
pub const COUNT_EXTENSION: i16 = -2;

/// Header lives at offset 0 of the region.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub capacity: u32,
    pub used: u32,
    pub entries: u32,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// The fixed-size part of every slot, regardless of role.
///
/// `count` is the role discriminator and collision tally. `hash` is the
/// home index for leading/colliding slots, or the
/// back-link for extension slots. `link` is the next slot in the value
/// chain, or `LINK_NONE`. `size` is the number of value bytes this slot's
/// payload region holds.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SlotHeader {
    pub count: i16,
    pub _pad: [u8; 2],
    pub hash: u32,
    pub link: i32,
    pub size: u32,
}

pub const SLOT_HEADER_SIZE: usize = std::mem::size_of::<SlotHeader>();
const _: () = assert!(SLOT_HEADER_SIZE == 16);

/// Byte width of the payload region following a slot header, for a given
/// `(KEYMAX, VALMAX)` pair. Identical for both the `pair` and `ext`
/// shapes, so every slot is interchangeable.
pub const fn payload_size(keymax: usize, valmax: usize) -> usize {
    keymax + 16 + std::mem::size_of::<u16>() + valmax
}

/// Total byte width of one slot for the given `(KEYMAX, VALMAX)` pair.
pub const fn slot_size(keymax: usize, valmax: usize) -> usize {
    SLOT_HEADER_SIZE + payload_size(keymax, valmax)
}

/// Offsets within a slot's *payload region* (i.e. relative to the byte
/// just past the `SlotHeader`) for the `pair` shape: `key[KEYMAX]`,
/// `fingerprint[16]`, `keylen: u16`, `value[VALMAX]`.
pub mod pair_offset {
    pub const fn key() -> usize {
        0
    }
    pub const fn fingerprint(keymax: usize) -> usize {
        keymax
    }
    pub const fn keylen(keymax: usize) -> usize {
        keymax + 16
    }
    pub const fn value(keymax: usize) -> usize {
        keymax + 16 + std::mem::size_of::<u16>()
    }
}

/// Offset within a slot's payload region for the `ext` shape: raw value
/// bytes starting at offset 0 (the whole payload region is one flat
/// `raw[EXTMAX]` buffer).
pub mod ext_offset {
    pub const fn raw() -> usize {
        0
    }
}

/// Compute the required byte size for a target slot capacity.
pub fn required_size(capacity: u32, keymax: usize, valmax: usize) -> usize {
    HEADER_SIZE + capacity as usize * slot_size(keymax, valmax)
}

/// Compute the slot capacity that fits in `size` bytes.
pub fn capacity_for_size(size: usize, keymax: usize, valmax: usize) -> u32 {
    if size < HEADER_SIZE + slot_size(keymax, valmax) {
        return 0;
    }
    ((size - HEADER_SIZE) / slot_size(keymax, valmax)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_matches_three_u32_fields() {
        assert_eq!(HEADER_SIZE, 12);
    }

    #[test]
    fn slot_header_size_is_16_bytes_for_every_instantiation() {
        // The slot header's layout does not depend on KEYMAX/VALMAX.
        assert_eq!(SLOT_HEADER_SIZE, 16);
    }

    #[test]
    fn slot_size_matches_expected_width_for_several_instantiations() {
        for &(keymax, valmax) in &[(16usize, 0usize), (32, 64), (255, 4096)] {
            let expected = 16 + keymax + 16 + std::mem::size_of::<u16>() + valmax;
            assert_eq!(slot_size(keymax, valmax), expected);
            assert_eq!(payload_size(keymax, valmax), expected - 16);
        }
    }

    #[test]
    fn capacity_for_size_round_trips_with_required_size() {
        let (keymax, valmax) = (24, 48);
        for capacity in [1u32, 2, 7, 100] {
            let size = required_size(capacity, keymax, valmax);
            assert_eq!(capacity_for_size(size, keymax, valmax), capacity);
        }
    }

    #[test]
    fn capacity_for_size_is_zero_below_one_slot() {
        assert_eq!(capacity_for_size(0, 32, 64), 0);
        assert_eq!(capacity_for_size(HEADER_SIZE, 32, 64), 0);
    }
}
