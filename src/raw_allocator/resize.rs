//! The four-case resize strategy: shrink-or-equal, coalesce-right in place,
//! coalesce-around with a direction-safe copy, and relocate.

use super::chunk;
use super::coalesce;
use super::free_list::{self, CLASSES};
use super::offset::Offset;
use super::policy;
use super::word;
use core::ptr::NonNull;

/// Resize the taken chunk at `off` to `size` words. Assumes `off` has
/// already been validated as a live taken chunk and `size` exceeds the
/// chunk's current size (the shrink-or-equal case is the only one that
/// doesn't grow, and is handled first below regardless).
pub(crate) fn resize_chunk(
    buffer: &mut [u8],
    lists: &mut [u32; CLASSES],
    power: u8,
    off: Offset,
    size: usize,
) -> Option<NonNull<u8>> {
    let cur_size = chunk::abs_size(buffer, off);

    // Case 1: shrink or equal. No split, even if the remainder would be a
    // valid chunk — a deliberate simplicity choice (see DESIGN.md).
    if cur_size >= size {
        return Some(chunk::payload_ptr(buffer, off));
    }

    // Case 2: coalesce-right in place. `off` never moves when only the
    // right direction merges, so the payload stays at the same address.
    let probe_right = coalesce::probe(buffer, off, false, true) - 2;
    if probe_right >= size {
        let merged = coalesce::coalesce(buffer, lists, power, off, false, true);
        return Some(policy::carve(buffer, lists, power, merged, size, false));
    }

    // Case 3: coalesce-around with copy. `probe_right` already counts `off`
    // once; add the left side's contribution without double-counting it.
    let span = cur_size + 2;
    let probe_left = coalesce::probe(buffer, off, true, false);
    let total_around = probe_right + probe_left - span;
    if total_around >= size {
        let old_payload_word = off.word_index() + 1;
        let copy_words = core::cmp::min(cur_size, size);
        let merged = coalesce::coalesce(buffer, lists, power, off, true, true);
        let new_payload_word = merged.word_index() + 1;
        // Move the live payload before `carve` retags the merged chunk: a
        // left merge shifts the payload's start backward, and carving a
        // region smaller than the full merge writes its footer (and, if it
        // splits off a remainder, that remainder's tags too) somewhere past
        // `new_payload_word + size`, which can fall inside the old payload's
        // still-unread tail. Copying first means `carve` only ever writes at
        // or beyond `new_payload_word + copy_words`.
        word::copy_words_directional(buffer, old_payload_word, new_payload_word, copy_words);
        let ptr = policy::carve(buffer, lists, power, merged, size, false);
        return Some(ptr);
    }

    // Case 4: relocate. Find a fresh chunk before touching the old one, so
    // a failed allocation leaves the original pointer untouched.
    let new_off = policy::find_fit(buffer, lists, power, size)?;
    free_list::remove(buffer, lists, power, new_off);
    let old_payload_word = off.word_index() + 1;
    let new_payload_word = new_off.word_index() + 1;
    let ptr = policy::carve(buffer, lists, power, new_off, size, false);
    let copy_words = core::cmp::min(cur_size, size);
    word::copy_words_directional(buffer, old_payload_word, new_payload_word, copy_words);
    let _ = policy::release_chunk(buffer, lists, power, off);
    Some(ptr)
}
