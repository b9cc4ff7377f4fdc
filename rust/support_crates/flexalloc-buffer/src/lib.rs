//! An append-only, alignment-aware buffer of plain-old-data elements backed by
//! raw allocator blocks.

mod buffer;

pub use buffer::GrowableBuffer;
