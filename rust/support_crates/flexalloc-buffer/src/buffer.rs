use std::marker::PhantomData;

use flexalloc_common::{Result, error::Error, result::verify_alignment, verify_arg};
use flexalloc_page_alloc::{MemoryBlock, PageAllocator, RawAllocator};

/// An append-only sequence of fixed-size elements stored in a single aligned
/// block.
///
/// The backing block is allocated eagerly with the alignment given at creation
/// and is replaced as the buffer grows. Growth doubles the capacity, first trying
/// to expand the block in place and otherwise allocating a new block, copying the
/// live elements and releasing the old one.
///
/// A failed growth leaves the buffer exactly as it was: length, capacity,
/// contents and backing block are only updated once the new storage is in
/// place.
///
/// Addresses of elements are not stable across [`GrowableBuffer::append`] calls.
pub struct GrowableBuffer<T, A = PageAllocator>
where
    A: RawAllocator,
{
    /// Backing store; empty when the capacity is zero.
    block: MemoryBlock,
    /// Number of live elements.
    len: usize,
    /// Number of elements the backing store is sized for.
    capacity: usize,
    /// Alignment of the backing store, used for every allocation and release.
    alignment: usize,
    allocator: A,
    _marker: PhantomData<T>,
}

impl<T> GrowableBuffer<T, PageAllocator>
where
    T: bytemuck::Pod,
{
    /// Creates a buffer backed by OS reservations, with room for
    /// `initial_capacity` elements and storage aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// See [`GrowableBuffer::with_allocator`].
    pub fn new(initial_capacity: usize, alignment: usize) -> Result<Self> {
        Self::with_allocator(initial_capacity, alignment, PageAllocator)
    }
}

impl<T, A> GrowableBuffer<T, A>
where
    T: bytemuck::Pod,
    A: RawAllocator,
{
    /// Creates a buffer with room for `initial_capacity` elements, drawing its
    /// storage from `allocator`.
    ///
    /// A zero `initial_capacity` defers allocation to the first append.
    ///
    /// # Errors
    ///
    /// - `InvalidAlignment` if `alignment` is not a power of two
    /// - `InvalidArgument` if `T` is zero-sized or more strictly aligned than
    ///   `alignment`
    /// - `ResourceExhausted` if the initial storage cannot be allocated
    pub fn with_allocator(initial_capacity: usize, alignment: usize, allocator: A) -> Result<Self> {
        verify_alignment(alignment)?;
        verify_arg!(element_size, std::mem::size_of::<T>() > 0);
        verify_arg!(alignment, alignment >= std::mem::align_of::<T>());

        let mut buffer = GrowableBuffer {
            block: MemoryBlock::EMPTY,
            len: 0,
            capacity: 0,
            alignment,
            allocator,
            _marker: PhantomData,
        };
        if initial_capacity > 0 {
            let size = Self::byte_size(initial_capacity)?;
            let block = buffer.allocator.allocate(size, alignment);
            if block.is_empty() {
                return Err(Error::resource_exhausted(size));
            }
            buffer.block = block;
            buffer.capacity = initial_capacity;
        }
        Ok(buffer)
    }

    /// Returns the number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of elements the buffer can hold before it must grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the alignment of the backing storage.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Returns the current backing block.
    ///
    /// The block is owned by the buffer and may be replaced by the next append.
    #[inline]
    pub fn block(&self) -> MemoryBlock {
        self.block
    }

    /// Returns the live elements in insertion order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        if self.block.is_empty() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.block.ptr() as *const T, self.len) }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Appends `value` at the end of the buffer, doubling the capacity first if
    /// the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if the buffer is full and cannot grow. The
    /// buffer is left unchanged in that case.
    pub fn append(&mut self, value: T) -> Result<()> {
        if self.len == self.capacity {
            let new_capacity = self
                .capacity
                .checked_mul(2)
                .ok_or_else(|| Error::resource_exhausted(usize::MAX))?
                .max(1);
            self.grow(new_capacity)?;
        }
        debug_assert!(self.len < self.capacity);
        unsafe { (self.block.ptr() as *mut T).add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Ensures room for `new_capacity` elements.
    ///
    /// Does nothing if the capacity is already at least `new_capacity`.
    /// Otherwise the backing block is expanded in place when possible; if not, a
    /// new block is allocated, the live elements are copied over and the old
    /// block is released.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if neither strategy can provide the storage,
    /// leaving the buffer unchanged.
    pub fn grow(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity <= self.capacity {
            return Ok(());
        }
        let new_size = Self::byte_size(new_capacity)?;

        if unsafe { self.allocator.try_expand(&mut self.block, new_size) } {
            log::trace!(
                "grew buffer in place: capacity {} -> {new_capacity}",
                self.capacity
            );
            self.capacity = new_capacity;
            return Ok(());
        }

        let new_block = self.allocator.allocate(new_size, self.alignment);
        if new_block.is_empty() {
            log::debug!("failed to grow buffer to {new_capacity} elements ({new_size} bytes)");
            return Err(Error::resource_exhausted(new_size));
        }

        if self.len != 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.block.ptr(),
                    new_block.ptr(),
                    self.len * std::mem::size_of::<T>(),
                );
            }
        }
        let old_block = std::mem::replace(&mut self.block, new_block);
        unsafe { self.allocator.deallocate(old_block, self.alignment) };
        log::trace!(
            "moved buffer to a new block: capacity {} -> {new_capacity}",
            self.capacity
        );
        self.capacity = new_capacity;
        Ok(())
    }

    /// Releases the backing storage and resets the buffer to zero length and
    /// capacity.
    ///
    /// The buffer stays usable: a later append allocates fresh storage.
    pub fn destroy(&mut self) {
        let block = std::mem::replace(&mut self.block, MemoryBlock::EMPTY);
        if !block.is_empty() {
            unsafe { self.allocator.deallocate(block, self.alignment) };
        }
        self.len = 0;
        self.capacity = 0;
    }

    fn byte_size(capacity: usize) -> Result<usize> {
        capacity
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::resource_exhausted(usize::MAX))
    }
}

impl<T, A> Drop for GrowableBuffer<T, A>
where
    A: RawAllocator,
{
    fn drop(&mut self) {
        let block = std::mem::replace(&mut self.block, MemoryBlock::EMPTY);
        if !block.is_empty() {
            unsafe { self.allocator.deallocate(block, self.alignment) };
        }
    }
}

impl<T, A> std::ops::Deref for GrowableBuffer<T, A>
where
    T: bytemuck::Pod,
    A: RawAllocator,
{
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<'a, T, A> IntoIterator for &'a GrowableBuffer<T, A>
where
    T: bytemuck::Pod,
    A: RawAllocator,
{
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, A> std::fmt::Debug for GrowableBuffer<T, A>
where
    T: bytemuck::Pod + std::fmt::Debug,
    A: RawAllocator,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("alignment", &self.alignment)
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use flexalloc_common::error::ErrorKind;
    use flexalloc_page_alloc::HeapAllocator;

    use super::*;

    #[test]
    fn test_new() {
        let buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.alignment(), 16);
        assert!(buffer.is_empty());
        assert!(buffer.block().is_aligned(16));
        assert!(buffer.block().size() >= 4 * std::mem::size_of::<i32>());
        assert!(buffer.as_slice().is_empty());
    }

    #[test]
    fn test_new_zero_capacity() {
        let mut buffer = GrowableBuffer::<u64>::new(0, 8).unwrap();
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.block().is_empty());
        assert!(buffer.as_slice().is_empty());

        buffer.append(9).unwrap();
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.as_slice(), &[9]);
    }

    #[test]
    fn test_new_invalid_arguments() {
        let err = GrowableBuffer::<i32>::new(4, 12).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidAlignment { alignment: 12 }));

        let err = GrowableBuffer::<u64>::new(4, 2).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

        let err = GrowableBuffer::<()>::new(4, 16).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_append_doubles_capacity() {
        let mut buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
        for value in 1..=5 {
            buffer.append(value).unwrap();
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
        assert!(buffer.block().is_aligned(16));
    }

    #[test]
    fn test_append_counts() {
        for count in [1usize, 4, 5, 100] {
            let mut buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
            for i in 0..count {
                buffer.append(i as i32 * 3).unwrap();
            }
            assert_eq!(buffer.len(), count);
            assert!(buffer.capacity() >= count);
            assert!(buffer.capacity().is_power_of_two());
            for (i, &v) in buffer.iter().enumerate() {
                assert_eq!(v, i as i32 * 3);
            }
        }
    }

    #[test]
    fn test_grow_is_noop_when_not_larger() {
        let mut buffer = GrowableBuffer::<u16>::new(8, 16).unwrap();
        buffer.append(1).unwrap();
        let block = buffer.block();
        buffer.grow(8).unwrap();
        buffer.grow(2).unwrap();
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.block(), block);
    }

    #[test]
    fn test_grow_explicit() {
        let mut buffer = GrowableBuffer::<u8>::new(4, 16).unwrap();
        buffer.append(1).unwrap();
        buffer.append(2).unwrap();
        buffer.grow(100_000).unwrap();
        assert_eq!(buffer.capacity(), 100_000);
        assert!(buffer.block().size() >= 100_000);
        assert_eq!(buffer.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_destroy() {
        let mut buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
        buffer.append(1).unwrap();
        buffer.destroy();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.block().is_empty());

        buffer.destroy();
        buffer.append(2).unwrap();
        assert_eq!(buffer.as_slice(), &[2]);
    }

    #[test]
    fn test_heap_backed_buffer() {
        let mut buffer = GrowableBuffer::<u32, _>::with_allocator(2, 16, HeapAllocator).unwrap();
        for i in 0..1000u32 {
            buffer.append(i).unwrap();
        }
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.capacity(), 1024);
        assert!(buffer.iter().copied().eq(0..1000u32));
    }

    #[test]
    fn test_over_aligned_buffer() {
        let alignment = flexalloc_page_alloc::page_granularity() * 2;
        let mut buffer = GrowableBuffer::<u64>::new(4, alignment).unwrap();
        for i in 0..5000u64 {
            buffer.append(i).unwrap();
        }
        assert!(buffer.block().is_aligned(alignment));
        assert!(buffer.iter().copied().eq(0..5000u64));
    }

    #[test]
    fn test_deref_and_debug() {
        let mut buffer = GrowableBuffer::<i32>::new(2, 4).unwrap();
        buffer.append(7).unwrap();
        buffer.append(8).unwrap();
        assert_eq!(buffer[1], 8);
        assert_eq!(buffer.get(0), Some(&7));
        assert_eq!(buffer.get(2), None);
        assert_eq!((&buffer).into_iter().sum::<i32>(), 15);

        let s = format!("{buffer:?}");
        assert!(s.contains("len: 2"));
        assert!(s.contains("[7, 8]"));
    }
}
