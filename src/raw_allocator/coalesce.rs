//! Directional merging of a free chunk with its adjacent free neighbors,
//! plus the non-destructive probe the resizer uses to decide whether an
//! in-place grow is possible before committing to one.

use super::chunk;
use super::free_list::{self, CLASSES};
use super::offset::Offset;

/// Merge `off` with its free neighbors in the requested directions.
///
/// Joining two adjacent free chunks of size `a` and `b` yields one chunk of
/// size `a + b + 2` (the absorbed neighbor's header/footer pair becomes
/// payload space). Right neighbors are absorbed first, keeping `off` fixed;
/// left neighbors are absorbed next, walking `off` leftward as each is
/// folded in. Returns the final chunk's offset (equal to the original `off`
/// unless a left merge occurred).
///
/// Postcondition: the returned chunk is free, header equals footer, it is a
/// member of no free list, and neither of its immediate neighbors is free.
pub(crate) fn coalesce(
    buffer: &mut [u8],
    lists: &mut [u32; CLASSES],
    power: u8,
    mut off: Offset,
    left: bool,
    right: bool,
) -> Offset {
    if right {
        loop {
            let r = chunk::right_neighbor(buffer, off);
            if r.is_nil() || !chunk::is_free(buffer, r) {
                break;
            }
            free_list::remove(buffer, lists, power, r);
            let merged = chunk::abs_size(buffer, off) + chunk::abs_size(buffer, r) + 2;
            chunk::set_size(buffer, off, merged as i32);
        }
    }
    if left {
        loop {
            let l = chunk::left_neighbor(buffer, off);
            if l.is_nil() || !chunk::is_free(buffer, l) {
                break;
            }
            free_list::remove(buffer, lists, power, l);
            let merged = chunk::abs_size(buffer, l) + chunk::abs_size(buffer, off) + 2;
            chunk::set_size(buffer, l, merged as i32);
            off = l;
        }
    }
    off
}

/// Non-destructively measure what [`coalesce`] would produce: the sum of
/// `size + 2` over `off` and every adjacent free neighbor in the requested
/// directions, without unlinking or merging anything. Visits exactly the
/// chunks the destructive coalesce would visit.
pub(crate) fn probe(buffer: &[u8], off: Offset, left: bool, right: bool) -> usize {
    let mut total = chunk::abs_size(buffer, off) + 2;

    if right {
        let mut cur = off;
        loop {
            let r = chunk::right_neighbor(buffer, cur);
            if r.is_nil() || !chunk::is_free(buffer, r) {
                break;
            }
            total += chunk::abs_size(buffer, r) + 2;
            cur = r;
        }
    }
    if left {
        let mut cur = off;
        loop {
            let l = chunk::left_neighbor(buffer, cur);
            if l.is_nil() || !chunk::is_free(buffer, l) {
                break;
            }
            total += chunk::abs_size(buffer, l) + 2;
            cur = l;
        }
    }
    total
}
