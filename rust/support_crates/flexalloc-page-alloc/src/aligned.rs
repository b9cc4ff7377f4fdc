//! Value-level aligned allocation on top of the OS reservation primitive.
//!
//! These functions never fail loudly: an unusable request or an exhausted system
//! yields [`MemoryBlock::EMPTY`] (or `false` for [`try_expand`]), and release
//! failures are only logged. The alignment passed to [`allocate`] must be passed
//! unchanged to [`deallocate`] for the same block.
//!
//! Requests with an alignment the OS already guarantees (at most
//! [`page_granularity`]) map onto a single reservation. Stricter alignments
//! over-allocate by `alignment` bytes, round the address up, and give the caller
//! everything from the aligned address to the end of the over-allocation:
//!
//! ```text
//!   raw                aligned                          raw + size + alignment
//!    |   head (freed)     |          usable size                 |
//!    +--------------------+--------------------------------------+
//! ```
//!
//! The head is handed back to the OS right away, so the aligned address is the
//! start of its own reservation and can be released exactly.

use crate::{
    align::{align_down, align_up},
    block::MemoryBlock,
    mmap,
};

/// Number of fresh reservations tried when moving an over-aligned reservation
/// onto its aligned address fails.
const REBASE_ATTEMPTS: usize = 8;

/// Returns the native allocation granularity: the alignment every OS reservation
/// is guaranteed to have.
///
/// The value is queried once and cached for the lifetime of the process.
#[inline]
pub fn page_granularity() -> usize {
    mmap::get_granularity()
}

/// Reserves at least `size` bytes whose address is a multiple of `alignment`.
///
/// Returns [`MemoryBlock::EMPTY`] if `alignment` is not a power of two, if `size`
/// is zero, or if the system cannot provide the memory. The returned block may
/// be larger than `size`; the extra bytes belong to the caller.
///
/// The memory is readable, writable and zero-filled.
pub fn allocate(size: usize, alignment: usize) -> MemoryBlock {
    if !alignment.is_power_of_two() || size == 0 {
        return MemoryBlock::EMPTY;
    }

    if alignment <= page_granularity() {
        match mmap::reserve(size, alignment) {
            Ok(ptr) => MemoryBlock::from_raw_parts(ptr as *mut u8, size),
            Err(e) => {
                log::debug!("reserve({size}) failed: {e}");
                MemoryBlock::EMPTY
            }
        }
    } else {
        allocate_over_aligned(size, alignment)
    }
}

/// Releases a block obtained from [`allocate`].
///
/// Does nothing if `alignment` is not a power of two or if the block is empty.
/// A failure reported by the OS is logged and otherwise ignored.
///
/// # Safety
///
/// - `block` must have been returned by [`allocate`] (possibly grown by
///   [`try_expand`]) and not released since
/// - `alignment` must be the value passed to [`allocate`] for this block
/// - No references into the block may be used after this call
pub unsafe fn deallocate(block: MemoryBlock, alignment: usize) {
    if !alignment.is_power_of_two() || block.is_empty() {
        return;
    }

    let granularity = page_granularity();
    let base = if alignment <= granularity {
        block.ptr()
    } else {
        // Over-aligned blocks are granularity aligned, and their reservation was
        // rebased to start at the block address.
        let base = align_down(block.ptr() as usize, granularity);
        debug_assert_eq!(base, block.ptr() as usize);
        base as *mut u8
    };

    if let Err(e) = unsafe { mmap::release(base as _, block.size(), alignment) } {
        log::warn!(
            "failed to release {} bytes at {:?}: {e}",
            block.size(),
            block.ptr()
        );
    }
}

/// Attempts to grow `block` to `new_size` bytes without moving it.
///
/// On success the block's size becomes `new_size` (requests that already fit
/// leave the block untouched) and `true` is returned. On failure the block is
/// unchanged and `false` is returned; the caller is expected to fall back to
/// allocate, copy and release. Always fails for the empty block.
///
/// # Safety
///
/// `block` must have been returned by [`allocate`] (possibly grown by earlier
/// calls) and not released since.
pub unsafe fn try_expand(block: &mut MemoryBlock, new_size: usize) -> bool {
    if block.is_empty() {
        return false;
    }
    if new_size <= block.size() {
        return true;
    }
    if unsafe { mmap::extend_in_place(block.ptr() as _, block.size(), new_size) } {
        log::trace!(
            "expanded {:?} in place: {} -> {new_size}",
            block.ptr(),
            block.size()
        );
        block.set_size(new_size);
        true
    } else {
        false
    }
}

fn allocate_over_aligned(size: usize, alignment: usize) -> MemoryBlock {
    let Some(total) = size.checked_add(alignment) else {
        return MemoryBlock::EMPTY;
    };

    for attempt in 0..REBASE_ATTEMPTS {
        let raw = match mmap::reserve(total, page_granularity()) {
            Ok(ptr) => ptr,
            Err(e) => {
                log::debug!("reserve({total}) failed: {e}");
                return MemoryBlock::EMPTY;
            }
        };

        let aligned = align_up(raw as usize, alignment);
        let usable = raw as usize + total - aligned;
        debug_assert!(usable >= size);

        match unsafe { mmap::rebase(raw, total, aligned, usable, alignment) } {
            Ok(ptr) => return MemoryBlock::from_raw_parts(ptr as *mut u8, usable),
            Err(e) => log::debug!("rebase to {aligned:#x} failed (attempt {attempt}): {e}"),
        }
    }

    MemoryBlock::EMPTY
}
