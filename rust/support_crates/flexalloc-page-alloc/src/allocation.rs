//! Owned, self-releasing memory allocations.
//!
//! [`Allocation`] pairs a [`MemoryBlock`] with the alignment it was requested with
//! and the [`Backend`] that produced it, so that release and growth always go
//! through the right facility with the right parameters. The memory is returned
//! when the allocation is dropped.

use flexalloc_common::{Result, error::Error, result::verify_alignment, verify_arg};

use crate::{
    block::MemoryBlock,
    raw_allocator::{Backend, HeapAllocator, PageAllocator, RawAllocator},
};

/// An owned block of memory with a guaranteed alignment.
pub struct Allocation {
    /// The block; never empty.
    block: MemoryBlock,
    /// Alignment requested at allocation time.
    alignment: usize,
    /// Facility the block was obtained from.
    backend: Backend,
}

impl Allocation {
    /// Reserves at least `size` bytes aligned to `alignment` directly from the OS.
    ///
    /// The usable length may exceed `size` when `alignment` is larger than the
    /// native granularity. The memory is zero-filled.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` if `alignment` is not a power of two
    /// - `InvalidArgument` if `size` is zero
    /// - `ResourceExhausted` if the system cannot provide the memory
    pub fn reserve(size: usize, alignment: usize) -> Result<Allocation> {
        Self::with_backend(size, alignment, Backend::Reservation)
    }

    /// Allocates at least `size` zeroed bytes aligned to `alignment` from the
    /// process heap.
    ///
    /// # Errors
    ///
    /// Same as [`Allocation::reserve`]. On Windows, alignments above the heap
    /// guarantee are reported as `ResourceExhausted`.
    pub fn heap(size: usize, alignment: usize) -> Result<Allocation> {
        Self::with_backend(size, alignment, Backend::Heap)
    }

    /// Allocates through the given backend.
    pub fn with_backend(size: usize, alignment: usize, backend: Backend) -> Result<Allocation> {
        verify_alignment(alignment)?;
        verify_arg!(size, size > 0);

        let block = match backend {
            Backend::Reservation => PageAllocator.allocate(size, alignment),
            Backend::Heap => HeapAllocator.allocate(size, alignment),
        };
        if block.is_empty() {
            return Err(Error::resource_exhausted(size));
        }
        debug_assert!(block.is_aligned(alignment));
        Ok(Allocation {
            block,
            alignment,
            backend,
        })
    }

    /// Returns the number of usable bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.block.size()
    }

    /// Always `false`: allocations are never empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Returns a raw pointer to the first usable byte.
    ///
    /// The pointer must not be used after the `Allocation` is dropped or after a
    /// growth attempt.
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.block.ptr()
    }

    /// Returns the alignment the allocation was requested with.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Returns the underlying block.
    #[inline]
    pub fn block(&self) -> MemoryBlock {
        self.block
    }

    /// Attempts to grow the allocation to `new_size` bytes without moving it.
    ///
    /// Returns `true` if the allocation now holds at least `new_size` bytes at
    /// the same address with its contents preserved, and `false` if it is
    /// unchanged. Newly exposed bytes are zeroed.
    pub fn try_expand(&mut self, new_size: usize) -> bool {
        unsafe {
            match self.backend {
                Backend::Reservation => PageAllocator.try_expand(&mut self.block, new_size),
                Backend::Heap => HeapAllocator.try_expand(&mut self.block, new_size),
            }
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.block.ptr(), self.block.size()) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.block.ptr(), self.block.size()) }
    }

    /// Reinterprets the leading whole elements of the allocation as a slice of
    /// `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or more strictly aligned than the allocation.
    #[inline]
    pub fn as_slice<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        let bytes = self.as_bytes();
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>();
        bytemuck::cast_slice(&bytes[..whole])
    }

    /// Mutable counterpart of [`Allocation::as_slice`].
    #[inline]
    pub fn as_mut_slice<T>(&mut self) -> &mut [T]
    where
        T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
    {
        let bytes = self.as_bytes_mut();
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut bytes[..whole])
    }
}

impl std::ops::Deref for Allocation {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl std::ops::DerefMut for Allocation {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_bytes_mut()
    }
}

impl AsRef<[u8]> for Allocation {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsMut<[u8]> for Allocation {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }
}

impl Drop for Allocation {
    /// Releases the memory through the backend that produced it.
    fn drop(&mut self) {
        unsafe {
            match self.backend {
                Backend::Reservation => PageAllocator.deallocate(self.block, self.alignment),
                Backend::Heap => HeapAllocator.deallocate(self.block, self.alignment),
            }
        }
    }
}

// SAFETY: Allocation exclusively owns its memory and releases it on drop.
unsafe impl Send for Allocation {}

// SAFETY: shared access only hands out immutable views of the memory.
unsafe impl Sync for Allocation {}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &self.block.ptr())
            .field("len", &self.block.size())
            .field("alignment", &self.alignment)
            .field("backend", &self.backend)
            .finish()
    }
}
