use crate::{aligned, block::MemoryBlock, mmap};

/// Identifies the facility a block was obtained from.
///
/// Blocks must be released and grown through the same backend that produced
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Memory reserved directly from the OS virtual memory manager.
    Reservation,
    /// Memory obtained from the general-purpose process heap.
    Heap,
}

/// A source of raw memory blocks with best-effort in-place growth.
///
/// All failures are reported as values: [`MemoryBlock::EMPTY`] from
/// [`RawAllocator::allocate`] and `false` from [`RawAllocator::try_expand`].
///
/// # Safety
///
/// Implementors must guarantee that a non-empty block returned by `allocate`
/// points to at least `size()` readable and writable bytes aligned to the
/// requested alignment, exclusively owned by the caller until passed to
/// `deallocate`, and that a successful `try_expand` keeps the block address and
/// its existing contents.
pub unsafe trait RawAllocator {
    /// The backend blocks of this allocator come from.
    fn backend(&self) -> Backend;

    /// Allocates at least `size` bytes aligned to `alignment`.
    fn allocate(&self, size: usize, alignment: usize) -> MemoryBlock;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `block` must come from this allocator's `allocate`, must not have been
    /// released, and `alignment` must match the allocation request.
    unsafe fn deallocate(&self, block: MemoryBlock, alignment: usize);

    /// Attempts to grow `block` to `new_size` bytes without moving it.
    ///
    /// # Safety
    ///
    /// `block` must come from this allocator's `allocate` and must not have been
    /// released.
    unsafe fn try_expand(&self, block: &mut MemoryBlock, new_size: usize) -> bool;
}

/// Reservation-backed allocator: every block is its own OS reservation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageAllocator;

unsafe impl RawAllocator for PageAllocator {
    fn backend(&self) -> Backend {
        Backend::Reservation
    }

    #[inline]
    fn allocate(&self, size: usize, alignment: usize) -> MemoryBlock {
        aligned::allocate(size, alignment)
    }

    #[inline]
    unsafe fn deallocate(&self, block: MemoryBlock, alignment: usize) {
        unsafe { aligned::deallocate(block, alignment) }
    }

    #[inline]
    unsafe fn try_expand(&self, block: &mut MemoryBlock, new_size: usize) -> bool {
        unsafe { aligned::try_expand(block, new_size) }
    }
}

/// Heap-backed allocator built on the process heap.
///
/// In-place growth uses the heap manager's own non-moving reallocation where the
/// platform offers one. On Windows the process heap only honors alignments up to
/// 16 bytes (8 on 32-bit targets); stricter requests yield the empty block.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

unsafe impl RawAllocator for HeapAllocator {
    fn backend(&self) -> Backend {
        Backend::Heap
    }

    fn allocate(&self, size: usize, alignment: usize) -> MemoryBlock {
        if !alignment.is_power_of_two() || size == 0 {
            return MemoryBlock::EMPTY;
        }
        match mmap::heap_allocate(size, alignment) {
            Ok(ptr) => MemoryBlock::from_raw_parts(ptr as *mut u8, size),
            Err(e) => {
                log::debug!("heap_allocate({size}, {alignment}) failed: {e}");
                MemoryBlock::EMPTY
            }
        }
    }

    unsafe fn deallocate(&self, block: MemoryBlock, alignment: usize) {
        if !alignment.is_power_of_two() || block.is_empty() {
            return;
        }
        if let Err(e) = unsafe { mmap::heap_free(block.ptr() as _, block.size(), alignment) } {
            log::warn!("failed to free heap block at {:?}: {e}", block.ptr());
        }
    }

    unsafe fn try_expand(&self, block: &mut MemoryBlock, new_size: usize) -> bool {
        if block.is_empty() {
            return false;
        }
        let old_size = block.size();
        if new_size <= old_size {
            return true;
        }
        if unsafe { mmap::heap_grow_in_place(block.ptr() as _, old_size, new_size) } {
            block.set_size(new_size);
            true
        } else {
            false
        }
    }
}
