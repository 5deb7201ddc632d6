//! Best-fit search, split-on-allocate, clear-on-request and the release
//! path built on top of the chunk, free-list and coalescer primitives.

use super::chunk;
use super::coalesce;
use super::error::ReleaseError;
use super::free_list::{self, CLASSES};
use super::offset::Offset;
use super::word;
use core::ptr::NonNull;

/// Walk size classes from `class_of(size)` upward, returning the first
/// chunk whose size is at least `size`. Because each class is ordered by
/// non-decreasing size, the first hit in a class is the smallest fit in
/// that class; advancing classes on a miss yields a global best-fit
/// approximation bounded by class granularity.
pub(crate) fn find_fit(
    buffer: &[u8],
    lists: &[u32; CLASSES],
    power: u8,
    size: usize,
) -> Option<Offset> {
    let mut class = free_list::class_of(power, size);
    loop {
        let mut cur = Offset(lists[class]);
        while !cur.is_nil() {
            if chunk::abs_size(buffer, cur) >= size {
                return Some(cur);
            }
            cur = Offset(word::read_u32(buffer, cur.word_index() + 1));
        }
        class += 1;
        if class >= CLASSES {
            return None;
        }
    }
}

/// Check that `off` names a live, uncorrupted taken chunk.
pub(crate) fn validate_taken(buffer: &[u8], off: Offset) -> Result<(), ReleaseError> {
    let header = chunk::header(buffer, off);
    let size = header.unsigned_abs() as usize;
    let footer_word = off.word_index() + 1 + size;
    if footer_word >= buffer.len() / word::WORD {
        return Err(ReleaseError::Corrupted);
    }
    let footer = word::read_i32(buffer, footer_word);
    if header != footer {
        return Err(ReleaseError::Corrupted);
    }
    if header >= 0 {
        return Err(ReleaseError::DoubleFree);
    }
    Ok(())
}

/// Carve a taken chunk of exactly `size` words out of the free chunk at
/// `off` (already unlinked from every free list), splitting off and
/// reinserting a free remainder when one would itself be a valid chunk,
/// optionally zeroing the requested payload, and finally marking the result
/// taken. Returns the payload pointer.
pub(crate) fn carve(
    buffer: &mut [u8],
    lists: &mut [u32; CLASSES],
    power: u8,
    off: Offset,
    size: usize,
    zero: bool,
) -> NonNull<u8> {
    let original_size = chunk::abs_size(buffer, off);
    let splitting = original_size >= size + 4;
    let final_size = if splitting { size } else { original_size };

    chunk::set_size(buffer, off, final_size as i32);

    if splitting {
        let remainder_off = Offset::from_word_index(off.word_index() + 1 + final_size + 1);
        let remainder_size = original_size - final_size - 2;
        chunk::set_size(buffer, remainder_off, remainder_size as i32);
        free_list::insert(buffer, lists, power, remainder_off);
    }

    if zero {
        for w in 0..final_size {
            word::write_i32(buffer, off.word_index() + 1 + w, 0);
        }
    }

    chunk::set_size(buffer, off, -(final_size as i32));
    chunk::payload_ptr(buffer, off)
}

/// `release`: validate, flip to free, coalesce maximally, reinsert.
pub(crate) fn release_chunk(
    buffer: &mut [u8],
    lists: &mut [u32; CLASSES],
    power: u8,
    off: Offset,
) -> Result<(), ReleaseError> {
    validate_taken(buffer, off)?;
    let size = chunk::abs_size(buffer, off);
    chunk::set_size(buffer, off, size as i32);
    let merged = coalesce::coalesce(buffer, lists, power, off, true, true);
    free_list::insert(buffer, lists, power, merged);
    Ok(())
}
