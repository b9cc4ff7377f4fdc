//! Alignment-aware memory allocation on top of the operating system's virtual
//! memory reservation facility.
//!
//! The crate is layered:
//!
//! - [`mmap`]: thin, platform-specific wrappers over the OS primitives (reserve,
//!   release, in-place growth, page size and reservation granularity).
//! - [`aligned`]: the value-level allocator ([`allocate`], [`deallocate`],
//!   [`try_expand`]) operating on [`MemoryBlock`] values. Failures are reported as
//!   the empty block or `false`, never as errors.
//! - [`raw_allocator`]: the [`RawAllocator`] seam with a reservation-backed
//!   ([`PageAllocator`]) and a heap-backed ([`HeapAllocator`]) implementation.
//! - [`allocation`]: [`Allocation`], an owned block that remembers its alignment and
//!   backend and releases itself on drop.

pub mod align;
pub mod aligned;
pub mod allocation;
pub mod block;
pub mod raw_allocator;

#[cfg_attr(unix, path = "mmap_unix.rs")]
#[cfg_attr(windows, path = "mmap_win.rs")]
#[cfg_attr(not(any(unix, windows)), path = "mmap_fallback.rs")]
pub mod mmap;

pub use aligned::{allocate, deallocate, page_granularity, try_expand};
pub use allocation::Allocation;
pub use block::MemoryBlock;
pub use raw_allocator::{Backend, HeapAllocator, PageAllocator, RawAllocator};
