//! Simple allocator for embedded systems
//!
//! This crate provides a single type called [`Allocator`]. This type implements
//! the [`core::alloc::GlobalAlloc`]-trait, which is required to use the
//! [`alloc`-crate][alloc] on `#![no_std]`-targets. The allocator provided in
//! this crate is relatively simple, but reliable: its design is simple, so that
//! errors in the implementation are unlikely. Furthermore the crate is tested
//! by (unit) tests running under `miri`, so there shouldn't be any undefined
//! behavior.
//!
//! # Usage
//! The usage is simple: just copy and paste the following code snipped into
//! your binary crate and potentially adjust the number of bytes of the heap
//! (here 4K):
//! ```
//! #[global_allocator]
//! static ALLOCATOR: boundary_heap::Allocator<4096> = boundary_heap::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards you don't need to interact with the crate or the variable
//! `ALLOCATOR` anymore. Now you can just `use alloc::vec::Vec` or even
//! `use alloc::collections::BTreeMap`, i.e. every fancy collection which is
//! normally provided by the `std`.
//!
//! The minimal buffer size is `8`, which would allow exactly one allocation of
//! size up to 4 at a time. Adjust the size as necessary, e.g. by doing a worst
//! case calculation and potentially adding some backup space of 10% (for
//! example).
//!
//! Note to users with things like `MPU`s, `MMU`s, etc.: your device might
//! support things like memory remapping or memory protection with setting
//! read/write/execution rights. This crate _doesn't use_ those features at all!
//! If that is desired, you should take the address of the buffer and use that
//! along with the known size `N` to protect the heap memory. To users with a
//! fully-working MMU: it is recommended, that you use an allocator, that
//! actually supports paging, etc. This crate might still be helpful, e.g.
//! before setting up the MMU.
//!
//! # Using the engine directly
//! [`Allocator`] is a convenience wrapper for the common case of "I have a
//! `static` region and I want `#[global_allocator]`". If you already own a
//! `&mut [u8]` from somewhere else — a region carved out by a linker script,
//! a buffer handed down by a bootloader, a slice borrowed from a larger
//! arena shared between a few subsystems — and want the four-operation heap
//! interface (`allocate`/`zero_allocate`/`resize`/`release`) without going
//! through `core::alloc::GlobalAlloc` at all, use [`Heap`] directly. It takes
//! no lock and keeps no global state; `&mut self` on every method is the only
//! synchronization there is, same as any other borrowed-buffer type.
//!
//! # Implementation
//! Every chunk of memory carries a signed 32-bit header *and* a matching
//! footer, one word before and one word after its payload; the sign of
//! both encodes free (positive) vs. taken (negative), and their magnitude
//! is the payload size in words. A free chunk's first two payload words
//! double up as forward/backward links threading it into one of eight
//! size-class free lists (`power` picks the class boundaries), each kept
//! sorted by non-decreasing size so the first fit in a class is always its
//! smallest fit. The footer is what makes the allocator able to walk
//! *backwards* from any chunk to its left neighbor without a scan — the
//! detail the basic algorithm below builds on.
//! 1.  We start with an empty buffer: one free chunk, header and footer
//!     both holding its size.
//!     ```text
//!     pppp 0000 0000 0000 0000 0000 0000 pppp
//!     ^--- ^-------------------------------^--
//!     FREE size = 28            (header)  (footer, same value)
//!     ```
//! 2.  A block of 8 is allocated. The free chunk's size-class list yields
//!     it (it's the only entry); since what remains after carving out 8
//!     bytes is still a valid chunk, the allocator splits it in two.
//!     ```text
//!     xxxx 0000 0000 xxxx yyyy 0000 0000 yyyy
//!     ^--- ^-------- ^--- ^--- ^---------^---
//!     USED size = 8 (hdr/ftr)  FREE size = 16 (hdr/ftr)
//!     ```
//!     The new free remainder is reinserted into its size class.
//! 3.  Another block of 4 is allocated the same way, splitting the
//!     remaining free chunk again.
//! 4.  A request for a block of 16 comes in. Every size class from the
//!     smallest one that could hold 16 words upward is walked; none has a
//!     chunk that large, so the allocation fails and nothing is touched.
//! 5.  A block of 5 is allocated. If the remaining free chunk isn't large
//!     enough to both satisfy the request *and* leave behind a valid chunk
//!     (at least 2 payload words plus its own header/footer), the whole
//!     chunk is handed out unsplit rather than wasting words on a
//!     too-small remainder.
//! 6.  A request for a block of 1 comes in with no free memory left at
//!     all; it fails the same way step 4 did.
//! 7.  The block from step 5 is freed: its header and footer are flipped
//!     positive and it's reinserted into its size class.
//! 8.  The block from step 2 is freed too. Freeing always probes both
//!     neighbors through their footers/headers and merges with whichever
//!     ones are free, maximally, in both directions — not just to the
//!     right. A chunk's left neighbor is found by reading the footer one
//!     word before its own header, which is exactly what the footer is
//!     for.
//! 9.  A block of 8 is allocated again. Within whichever size class
//!     satisfies it, the ordered free list means the smallest adequate
//!     chunk is picked first — not an arbitrary one.
//! 10. A block is freed and coalesces with both of its free neighbors in
//!     one pass: unlink each, fold its size in (reclaiming its header and
//!     footer as payload space), and keep walking outward until neither
//!     side is free anymore.
//! 11. Repeated alloc/free cycles never leave two adjacent chunks free at
//!     once — the invariant maintained by step 10's maximal merge means
//!     there is nothing left to scan for and fix up later; the engine
//!     never accumulates the kind of one-sided fragmentation that a
//!     right-only coalesce would.
//!
//! [alloc]: https://doc.rust-lang.org/alloc/index.html
//! [gist_hosted-test]: https://gist.github.com/jfrimmel/61943f9879adfbe760a78efa17a0ecaa
//! [`Cell<T>`]: core::cell::Cell
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod raw_allocator;
pub use raw_allocator::{Heap, ReleaseError};
use raw_allocator::RawAllocator;

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// The memory allocator for embedded systems.
///
/// This is the core type of this crate: it is an allocator with a predefined
/// heap size. Therefore the heap memory usage is statically limited to an upper
/// value, which also helps to prevent issues with heap/stack-smashes, as the
/// heap is counted to the static memory (e.g. `.data`/`.bss`-sections). Such a
/// smash might still happen though, if the stack pointer grows into the heap,
/// but the heap cannot grow into the stack pointer.
///
/// Its usage is simple: just copy and paste the following in the binary crate
/// you're developing. The memory size of the heap is `4096` or 4K in this
/// example. Adjust that value to your needs.
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: boundary_heap::Allocator<4096> = boundary_heap::Allocator::new();
/// ```
/// Also please refer to the [crate-level](crate)-documentation for
/// recommendations on the buffer size and general usage.
pub struct Allocator<const N: usize> {
    /// The internal raw allocator.
    ///
    /// The raw allocator handles allocations of contiguous byte slices without
    /// needing to worry about alignment. The raw allocator is protected by a
    /// `spin::Mutex` to make it usable with shared references (requirement of
    /// [`GlobalAlloc`]).
    raw: spin::Mutex<RawAllocator<N>>,
}
impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// This function is a `const fn`, therefore you can call it directly when
    /// creating the allocator.
    ///
    /// Please see the [crate-level](crate)-documentation for recommendations on
    /// the buffer size and general usage.
    ///
    /// # Panics
    /// This function will panic, if the supplied buffer size, i.e. `N` is less
    /// than `8` or not divisible by `4`.
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        let raw = spin::Mutex::new(RawAllocator::new());
        Self { raw }
    }

    /// Align a given pointer to the specified alignment.
    ///
    /// # Safety
    /// This function requires `align` to be a power of two and requires the
    /// `ptr` to point to a memory region, that is large enough, so that the
    /// aligned pointer is still in that memory region.
    unsafe fn align_to(ptr: *mut u8, align: usize) -> *mut u8 {
        let addr = ptr as usize;
        let mismatch = addr & (align - 1);
        let offset = if mismatch != 0 { align - mismatch } else { 0 };
        // SAFETY: "in-bound"-requirement is part of the safety-contract of this
        // function, therefore the caller is responsible for it
        unsafe { ptr.add(offset) }
    }

    /// Align `ptr` up to `align` (a power of two greater than the engine's
    /// native 4-byte guarantee), stashing the shift amount in the four bytes
    /// immediately before the aligned pointer so [`dealloc`](Self::dealloc)
    /// can recover `ptr` again. Unlike [`Self::align_to`], the shift is
    /// always strictly positive (never zero), even when `ptr` already
    /// satisfies `align`, so there's always room for the back-offset word.
    ///
    /// # Safety
    /// Requires `align` to be a power of two and at least `2 * align` bytes
    /// of writable memory to be available starting at `ptr`.
    unsafe fn align_up_with_backptr(ptr: *mut u8, align: usize) -> *mut u8 {
        let addr = ptr as usize;
        let mismatch = addr & (align - 1);
        let mut offset = align - mismatch;
        if offset < core::mem::size_of::<u32>() {
            offset += align;
        }
        // SAFETY: `offset <= 2 * align`, within the caller-guaranteed region.
        let aligned = unsafe { ptr.add(offset) };
        // SAFETY: `aligned` is at least `size_of::<u32>()` bytes past `ptr`
        // by construction above, so the write lands inside the same region.
        unsafe { aligned.sub(4).cast::<u32>().write_unaligned(offset as u32) };
        aligned
    }
}
// SAFETY: the safety contracts of global allocator is a bit lengthy, but in
// short: the implementation does not panic (at least on purpose, if it would,
// there is a bug) and it actually adheres to the layout requirements (ensured
// by tests).
unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align();
        // the engine's boundary-tag chunks are always 4-byte-aligned (§3),
        // therefore smaller alignments are always fulfilled as-is. Larger
        // alignments require over-allocation and adjusting the pointer
        // accordingly, plus a back-offset word stashed just before the
        // adjusted pointer so `dealloc` can recover the exact payload
        // pointer the engine handed out (the engine only knows how to free
        // chunks at that exact address, see §4.1). `2 * align` extra bytes
        // is enough room for `align_up_with_backptr`'s worst-case shift.
        let size = if align > 4 {
            layout.size() + 2 * align
        } else {
            layout.size()
        };

        // allocate a memory block and return the sufficiently aligned pointer
        // into that memory block.
        match self.raw.lock().alloc(size) {
            // SAFETY: `align` is a power of two as by the contract of `Layout`.
            // Furthermore the memory slice is enlarged (see above), so that the
            // aligned pointer will still be in the same allocation.
            Some(memory) => unsafe {
                let base = memory.as_ptr();
                if align > 4 {
                    Self::align_up_with_backptr(base, align)
                } else {
                    Self::align_to(base, align)
                }
            },
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // For alignments above the engine's native 4-byte guarantee, `alloc`
        // returned a pointer shifted forward from the chunk it actually
        // allocated and stashed the shift amount immediately before it;
        // recover the original pointer before handing it back to the engine,
        // which only accepts the exact payload pointer it produced.
        let ptr = if layout.align() > 4 {
            // SAFETY: `ptr` was produced by `align_up_with_backptr`, which
            // always writes a valid back-offset in the 4 bytes before it.
            let offset = unsafe { ptr.sub(4).cast::<u32>().read_unaligned() };
            // SAFETY: subtracting the stored offset reverses the forward
            // shift `alloc` applied, landing back on the original pointer.
            unsafe { ptr.sub(offset as usize) }
        } else {
            ptr
        };
        // `RawAllocator::free` detects corruption/double-free internally.
        // The `free()`-method might detect errors, but those cannot lead to panics
        // (by contract of `GlobalAlloc`). Therefore there are two choices:
        // 1. abort the process
        // 2. ignore the error
        // Since there is no process and there is no stable way to abort the
        // program on `core` the only viable option is option #1: do nothing.
        // SAFETY: `GlobalAlloc::dealloc`'s contract guarantees `ptr` is
        // non-null.
        let ptr = unsafe { ptr::NonNull::new_unchecked(ptr) };
        let _maybe_error = self.raw.lock().free(ptr).ok();
        // errors are ignored
    }
}

#[cfg(test)]
mod tests {
    use crate::Allocator;
    use core::alloc::{GlobalAlloc, Layout};
    use core::ptr;

    #[test]
    fn alignment_of_align_to() {
        // create buffer memory for proper indexing. One could use random
        // integers and cast them to pointers, but this would violate the strict
        // provenance rules and `miri` would detect that. Therefore this uses a
        // valid and suitable aligned buffer and uses pointers into that buffer.
        #[repr(align(16))]
        struct Align([u8; 16]);
        let mut just_a_buffer_to_get_a_valid_address = Align([0_u8; 16]);
        let base: *mut u8 = ptr::addr_of_mut!(just_a_buffer_to_get_a_valid_address.0).cast();

        // create some pointers to the buffer with some offsets
        let ptr_0x10 = base;
        let ptr_0x11 = base.wrapping_add(1);
        let ptr_0x14 = base.wrapping_add(4);
        let ptr_0x1c = base.wrapping_add(0xc);
        let ptr_0x20 = base.wrapping_add(0x10);

        // the actual test for the alignment of `align_to()`
        assert_eq!(unsafe { Allocator::<8>::align_to(ptr_0x11, 4) }, ptr_0x14);
        assert_eq!(unsafe { Allocator::<8>::align_to(ptr_0x10, 4) }, ptr_0x10);

        assert_eq!(unsafe { Allocator::<8>::align_to(ptr_0x11, 1) }, ptr_0x11);

        assert_eq!(unsafe { Allocator::<8>::align_to(ptr_0x1c, 16) }, ptr_0x20);
    }

    // the following tests ensure, that a pointer with the requested alignment
    // is returned

    /// Assert the given alignment of pointers.
    macro_rules! assert_alignment {
        ($ptr:expr, $align:expr) => {{
            assert_eq!(($ptr as usize) % $align, 0, "Alignment not fulfilled");
        }};
    }

    #[test]
    fn small_alignments() {
        let allocator = Allocator::<32>::new();

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(8, 2).unwrap()) };
        assert_alignment!(ptr, 1);

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 4).unwrap()) };
        assert_alignment!(ptr, 4);
    }

    #[test]
    fn medium_alignments() {
        let allocator = Allocator::<128>::new();

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 8).unwrap()) };
        assert_alignment!(ptr, 8);

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 32).unwrap()) };
        assert_alignment!(ptr, 32);
    }

    #[cfg(not(miri))] // too slow
    #[test]
    fn huge_alignment() {
        // in static memory to prevent stack overflow
        const FOUR_MEG: usize = 4 * 1024 * 1024;

        static ALLOCATOR: Allocator<{ 10 * 1024 * 1024 }> = Allocator::new();
        let ptr = unsafe { ALLOCATOR.alloc(Layout::from_size_align(4, FOUR_MEG).unwrap()) };

        assert_alignment!(ptr, FOUR_MEG);
    }

    #[test]
    fn over_aligned_round_trip_reclaims_the_arena() {
        // A large alignment forces the over-allocation + back-offset path in
        // `alloc`/`dealloc`. Freeing it, then being able to allocate a chunk
        // spanning (close to) the whole arena again, is evidence the stashed
        // back-offset recovered the exact original payload pointer rather
        // than some nearby address that would corrupt the chunk tags.
        let allocator = Allocator::<256>::new();

        let layout = Layout::from_size_align(8, 32).unwrap();
        let ptr = unsafe { allocator.alloc(layout) };
        assert_ne!(ptr, ptr::null_mut());
        assert_alignment!(ptr, 32);
        unsafe { ptr.write_bytes(0xAB, 8) };

        unsafe { allocator.dealloc(ptr, layout) };

        let big = unsafe { allocator.alloc(Layout::from_size_align(200, 1).unwrap()) };
        assert_ne!(big, ptr::null_mut());
    }

    #[test]
    fn example_usage() {
        // do some example allocations. There is an intermediate deallocation,
        // different allocation/deallocation-orders, different alignments and
        // different sizes.
        static ALLOCATOR: Allocator<4096> = Allocator::new();

        unsafe {
            let layout1 = Layout::new::<u32>();
            let ptr1 = ALLOCATOR.alloc(layout1);
            assert_ne!(ptr1, ptr::null_mut());

            let layout2 = Layout::new::<f64>();
            let ptr2 = ALLOCATOR.alloc(layout2);
            assert_ne!(ptr2, ptr::null_mut());

            let layout3 = Layout::new::<[u16; 12]>();
            let ptr3 = ALLOCATOR.alloc(layout3);
            assert_ne!(ptr3, ptr::null_mut());

            ALLOCATOR.dealloc(ptr2, layout2);

            let layout4 = Layout::new::<[u128; 3]>();
            let ptr4 = ALLOCATOR.alloc(layout4);
            assert_ne!(ptr4, ptr::null_mut());

            let layout5 = Layout::new::<f32>();
            let ptr5 = ALLOCATOR.alloc(layout5);
            assert_ne!(ptr5, ptr::null_mut());

            ALLOCATOR.dealloc(ptr3, layout3);
            ALLOCATOR.dealloc(ptr4, layout4);
            ALLOCATOR.dealloc(ptr5, layout5);
            ALLOCATOR.dealloc(ptr1, layout1);
        }
    }
}
