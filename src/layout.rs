//! Defines the layout of a node page.
//!
//! The layout is:
//!
//! kind:       2 bytes
//! count:      2 bytes
//! pointers:   8 bytes * ptr_slots (count + 1 for internal, count for leaf)
//! offsets:    2 bytes * count
//! entries:    [key len: 2][key][val len: 2][val] * count (variable size)
//!
//! All integers are little endian. Offset slot `i - 1` holds the position of
//! entry `i` relative to the start of the entries, for `i in 1..count`. The
//! offset of entry 0 is always 0 and is not stored. The last offset slot is
//! reserved and stays zero.
use zerocopy::{
    byteorder::{LittleEndian, U16, U64},
    AsBytes, FromBytes, FromZeroes, Unaligned,
};

/// Size of a persisted node.
pub const PAGE_SIZE: usize = 4096;
/// Size of a scratch node. A node is built here before it is split.
pub const SCRATCH_SIZE: usize = 2 * PAGE_SIZE;

pub const MAX_KEY_SIZE: usize = 1000;
pub const MAX_VAL_SIZE: usize = 3000;

pub const HEADER_SIZE: usize = 4;
pub const PTR_SIZE: usize = 8;
pub const OFFSET_SIZE: usize = 2;
/// Key length and value length prefixes of an entry.
pub const ENTRY_PREFIX_SIZE: usize = 4;

pub const KIND_INTERNAL: u16 = 1;
pub const KIND_LEAF: u16 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct Header {
    pub kind: U16<LittleEndian>,
    pub count: U16<LittleEndian>,
}

pub fn read_u16(buf: &[u8], pos: usize) -> u16 {
    U16::<LittleEndian>::read_from_prefix(&buf[pos..])
        .expect("u16 slot inside buffer")
        .get()
}

pub fn write_u16(buf: &mut [u8], pos: usize, value: u16) {
    U16::<LittleEndian>::new(value)
        .write_to_prefix(&mut buf[pos..])
        .expect("u16 slot inside buffer");
}

pub fn read_u64(buf: &[u8], pos: usize) -> u64 {
    U64::<LittleEndian>::read_from_prefix(&buf[pos..])
        .expect("u64 slot inside buffer")
        .get()
}

pub fn write_u64(buf: &mut [u8], pos: usize, value: u64) {
    U64::<LittleEndian>::new(value)
        .write_to_prefix(&mut buf[pos..])
        .expect("u64 slot inside buffer");
}

/// Number of pointer slots for a node of the given kind.
///
/// This is the one rule all position math derives from.
#[inline(always)]
pub fn ptr_slots(kind: u16, count: usize) -> usize {
    if kind == KIND_INTERNAL {
        count + 1
    } else {
        count
    }
}

/// Size of header, pointer array and offset array.
#[inline(always)]
pub fn prefix_size(kind: u16, count: usize) -> usize {
    HEADER_SIZE + PTR_SIZE * ptr_slots(kind, count) + OFFSET_SIZE * count
}

/// Encoded size of a single entry, excluding its pointer and offset slots.
#[inline(always)]
pub fn entry_size(key_len: usize, val_len: usize) -> usize {
    ENTRY_PREFIX_SIZE + key_len + val_len
}
