//! Chunk primitives: header/footer access, the sign-as-status convention
//! and adjacency walks.
//!
//! A chunk is a run of words `[h, h+1+size]` where `size = |header|`:
//!
//! ```text
//! word h         header (signed), positive = free, negative = taken
//! word h+1       payload word 0 (forward free-list link when free)
//! word h+2       payload word 1 (backward free-list link when free)
//! word h+3..     remaining payload words
//! word h+1+size  footer, always equal to the header
//! ```
//!
//! `size >= 2` always, so the two link words are always available to a free
//! chunk even at the minimum chunk size.

use super::offset::Offset;
use super::word;
use core::ptr::NonNull;

/// Round a byte request up to whole words, enforcing the two-word minimum
/// chunk payload (the two free-list link slots).
pub(crate) fn words_for_bytes(bytes: usize) -> usize {
    let words = (bytes + 3) >> 2;
    if words < 2 {
        2
    } else {
        words
    }
}

/// Read the raw signed header word.
pub(crate) fn header(buffer: &[u8], off: Offset) -> i32 {
    word::read_i32(buffer, off.word_index())
}

/// Absolute chunk size in words, regardless of free/taken status.
pub(crate) fn abs_size(buffer: &[u8], off: Offset) -> usize {
    header(buffer, off).unsigned_abs() as usize
}

pub(crate) fn is_free(buffer: &[u8], off: Offset) -> bool {
    header(buffer, off) > 0
}

/// Write header and footer together so they can never drift apart.
/// `signed_size`'s sign encodes the chunk's status; its magnitude is its size.
pub(crate) fn set_size(buffer: &mut [u8], off: Offset, signed_size: i32) {
    let size = signed_size.unsigned_abs() as usize;
    word::write_i32(buffer, off.word_index(), signed_size);
    word::write_i32(buffer, off.word_index() + 1 + size, signed_size);
}

/// The pointer handed to callers: one word past the header, i.e. payload
/// word 0.
pub(crate) fn payload_ptr(buffer: &mut [u8], off: Offset) -> NonNull<u8> {
    let byte_index = (off.word_index() + 1) * word::WORD;
    // SAFETY: byte_index lies within buffer for any chunk produced by this
    // engine, since the header's size field always fits before the arena end.
    unsafe { NonNull::new_unchecked(buffer.as_mut_ptr().add(byte_index)) }
}

/// Recover a chunk's offset from a payload pointer previously produced by
/// [`payload_ptr`] for the same buffer.
///
/// Callers must guarantee `ptr` actually originated from this arena; this is
/// the same contract the spec places on `release`/`resize`'s pointer
/// argument ("ptr from same state").
pub(crate) fn offset_from_ptr(buffer: &[u8], ptr: NonNull<u8>) -> Offset {
    let base = buffer.as_ptr() as usize;
    let addr = ptr.as_ptr() as usize;
    let byte_offset = addr - base;
    let word_index = byte_offset / word::WORD - 1;
    Offset::from_word_index(word_index)
}

/// The chunk starting immediately after the current footer, or nil if that
/// would run off the end of the arena.
pub(crate) fn right_neighbor(buffer: &[u8], off: Offset) -> Offset {
    let size = abs_size(buffer, off);
    let right_header = off.word_index() + 2 + size;
    if right_header >= buffer.len() / word::WORD {
        Offset::NIL
    } else {
        Offset::from_word_index(right_header)
    }
}

/// The chunk whose footer is the word immediately preceding the current
/// header, or nil if that would run off the start of the arena.
pub(crate) fn left_neighbor(buffer: &[u8], off: Offset) -> Offset {
    let h = off.word_index();
    if h == 0 {
        return Offset::NIL;
    }
    let prev_footer = h - 1;
    let left_size = word::read_i32(buffer, prev_footer).unsigned_abs() as usize;
    let left_header = (prev_footer as isize) - 1 - (left_size as isize);
    if left_header < 0 {
        Offset::NIL
    } else {
        Offset::from_word_index(left_header as usize)
    }
}
