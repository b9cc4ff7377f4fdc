use std::cell::Cell;

use flexalloc_buffer::GrowableBuffer;
use flexalloc_page_alloc::{Backend, MemoryBlock, PageAllocator, RawAllocator};

/// Wraps the page allocator, counting calls and refusing to allocate once its
/// budget is used up.
#[derive(Default)]
struct TestAllocator {
    inner: PageAllocator,
    allocations_left: Cell<Option<usize>>,
    allow_expand: bool,
    allocations: Cell<usize>,
    releases: Cell<usize>,
    expansions: Cell<usize>,
}

impl TestAllocator {
    fn with_budget(allocations: usize, allow_expand: bool) -> TestAllocator {
        TestAllocator {
            allocations_left: Cell::new(Some(allocations)),
            allow_expand,
            ..Default::default()
        }
    }

    fn exhaust(&self) {
        self.allocations_left.set(Some(0));
    }
}

unsafe impl RawAllocator for TestAllocator {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn allocate(&self, size: usize, alignment: usize) -> MemoryBlock {
        if let Some(left) = self.allocations_left.get() {
            if left == 0 {
                return MemoryBlock::EMPTY;
            }
            self.allocations_left.set(Some(left - 1));
        }
        self.allocations.set(self.allocations.get() + 1);
        self.inner.allocate(size, alignment)
    }

    unsafe fn deallocate(&self, block: MemoryBlock, alignment: usize) {
        self.releases.set(self.releases.get() + 1);
        unsafe { self.inner.deallocate(block, alignment) }
    }

    unsafe fn try_expand(&self, block: &mut MemoryBlock, new_size: usize) -> bool {
        if !self.allow_expand {
            return false;
        }
        let expanded = unsafe { self.inner.try_expand(block, new_size) };
        if expanded {
            self.expansions.set(self.expansions.get() + 1);
        }
        expanded
    }
}

#[test]
fn test_scenario_capacity_four_alignment_sixteen() {
    let mut buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
    for value in [1, 2, 3, 4, 5] {
        buffer.append(value).unwrap();
    }
    assert_eq!(buffer.capacity(), 8);
    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
    buffer.destroy();
}

#[test]
fn test_append_fails_atomically_when_exhausted() {
    let allocator = TestAllocator::with_budget(1, false);
    let mut buffer = GrowableBuffer::<i32, _>::with_allocator(4, 16, allocator).unwrap();
    for value in 1..=4 {
        buffer.append(value).unwrap();
    }
    let block = buffer.block();

    let err = buffer.append(5).unwrap_err();
    assert!(err.is_resource_exhausted());
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.capacity(), 4);
    assert_eq!(buffer.block(), block);
    assert_eq!(buffer.as_slice(), &[1, 2, 3, 4]);
    assert_eq!(buffer.allocator().releases.get(), 0);

    // A failed append does not poison the buffer.
    assert!(buffer.append(6).is_err());
    assert_eq!(buffer.as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn test_initial_allocation_failure() {
    let allocator = TestAllocator::with_budget(0, true);
    let err = GrowableBuffer::<u8, _>::with_allocator(16, 16, allocator).unwrap_err();
    assert!(err.is_resource_exhausted());
}

#[test]
fn test_migration_copies_and_releases() {
    let allocator = TestAllocator::with_budget(usize::MAX, false);
    let mut buffer = GrowableBuffer::<u64, _>::with_allocator(4, 16, allocator).unwrap();
    for i in 0..100u64 {
        buffer.append(i * i).unwrap();
    }
    assert_eq!(buffer.len(), 100);
    assert_eq!(buffer.capacity(), 128);
    assert!(buffer.iter().copied().eq((0..100u64).map(|i| i * i)));

    // 4 -> 8 -> 16 -> 32 -> 64 -> 128: one initial allocation plus five moves,
    // each of which releases the block it replaced.
    let allocator = buffer.allocator();
    assert_eq!(allocator.allocations.get(), 6);
    assert_eq!(allocator.releases.get(), 5);
    assert_eq!(allocator.expansions.get(), 0);

    buffer.destroy();
    assert_eq!(buffer.allocator().releases.get(), 6);
}

#[test]
fn test_in_place_growth_avoids_reallocation() {
    let allocator = TestAllocator::with_budget(1, true);
    let mut buffer = GrowableBuffer::<i32, _>::with_allocator(4, 16, allocator).unwrap();
    let ptr = buffer.block().ptr();

    // 4 KiB of page slack covers the first doublings without another allocation.
    for value in 0..64 {
        buffer.append(value).unwrap();
    }
    assert_eq!(buffer.block().ptr(), ptr);
    assert_eq!(buffer.capacity(), 64);
    assert_eq!(buffer.allocator().allocations.get(), 1);
    assert!(buffer.allocator().expansions.get() >= 4);
    assert!(buffer.iter().copied().eq(0..64));
}

#[test]
fn test_exhaustion_after_growth() {
    let allocator = TestAllocator::with_budget(usize::MAX, false);
    let mut buffer = GrowableBuffer::<u32, _>::with_allocator(2, 8, allocator).unwrap();
    for i in 0..8 {
        buffer.append(i).unwrap();
    }
    buffer.allocator().exhaust();

    assert!(buffer.append(8).is_err());
    assert_eq!(buffer.len(), 8);
    assert_eq!(buffer.capacity(), 8);
    assert!(buffer.iter().copied().eq(0..8));
}

#[test]
fn test_random_append_lengths() {
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..20 {
        let initial = rng.usize(1..=16);
        let count = rng.usize(0..=2000);
        let mut buffer = GrowableBuffer::<i64>::new(initial, 16).unwrap();
        let expected: Vec<i64> = (0..count).map(|_| rng.i64(..)).collect();
        for &v in &expected {
            buffer.append(v).unwrap();
        }
        assert_eq!(buffer.len(), count);
        assert!(buffer.capacity() >= count);
        assert_eq!(buffer.as_slice(), expected.as_slice());
    }
}
