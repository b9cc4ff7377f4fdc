/// A span of memory handed out by an allocator.
///
/// A block is a plain value: it carries the address of the first usable byte and
/// the number of bytes guaranteed to be available there. The empty block
/// ([`MemoryBlock::EMPTY`]) has a null address and a zero size and is what the
/// allocation functions return instead of an error.
///
/// A block does not remember the alignment it was requested with. Callers of the
/// value-level API must pass the same alignment to every later operation on the
/// block; [`crate::Allocation`] does that bookkeeping for you.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBlock {
    ptr: *mut u8,
    size: usize,
}

impl MemoryBlock {
    /// The "no allocation occurred" value.
    pub const EMPTY: MemoryBlock = MemoryBlock {
        ptr: std::ptr::null_mut(),
        size: 0,
    };

    /// Builds a block from an address and a usable size.
    ///
    /// A null `ptr` or a zero `size` yields [`MemoryBlock::EMPTY`], so that a block
    /// is empty exactly when its address is null.
    #[inline]
    pub fn from_raw_parts(ptr: *mut u8, size: usize) -> MemoryBlock {
        if ptr.is_null() || size == 0 {
            MemoryBlock::EMPTY
        } else {
            MemoryBlock { ptr, size }
        }
    }

    /// Address of the first usable byte, or null for the empty block.
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Number of bytes available at [`MemoryBlock::ptr`].
    ///
    /// This may exceed the size that was originally requested.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_null()
    }

    /// Returns `true` if the block address is a multiple of `alignment`.
    ///
    /// The empty block is considered aligned to anything.
    #[inline]
    pub fn is_aligned(&self, alignment: usize) -> bool {
        crate::align::is_aligned(self.ptr as usize, alignment)
    }

    #[inline]
    pub(crate) fn set_size(&mut self, size: usize) {
        debug_assert!(!self.is_empty() && size > 0);
        self.size = size;
    }
}

impl Default for MemoryBlock {
    fn default() -> Self {
        MemoryBlock::EMPTY
    }
}
