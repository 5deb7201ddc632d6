//! Chunk identity expressed as an offset into the arena rather than a
//! machine pointer.
//!
//! Storing 32-bit word offsets instead of native pointers halves link
//! overhead on 64-bit targets and makes the arena position-independent: the
//! same encoded state is valid no matter where the backing buffer ends up
//! in the address space.

/// A word index into the arena, or the nil sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Offset(pub(crate) u32);

impl Offset {
    pub(crate) const NIL: Offset = Offset(0xFFFF_FFFF);

    pub(crate) const fn from_word_index(index: usize) -> Self {
        Offset(index as u32)
    }

    pub(crate) fn is_nil(self) -> bool {
        self == Self::NIL
    }

    pub(crate) fn word_index(self) -> usize {
        self.0 as usize
    }
}
