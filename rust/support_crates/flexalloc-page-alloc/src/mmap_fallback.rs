use std::alloc::{Layout, alloc_zeroed, dealloc};

/// Reserves `size` zeroed bytes (emulated with the global allocator).
pub fn reserve(size: usize, alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    let layout = page_layout(size, alignment)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }
    Ok(ptr as *mut std::ffi::c_void)
}

/// Replaces an over-sized reservation with one of `usable` bytes aligned to
/// `alignment`.
///
/// The global allocator cannot release part of a block, so the new block is a
/// fresh allocation and its address may differ from `aligned`.
pub unsafe fn rebase(
    raw: *mut std::ffi::c_void,
    total: usize,
    _aligned: usize,
    usable: usize,
    alignment: usize,
) -> std::io::Result<*mut std::ffi::c_void> {
    unsafe { release(raw, total, get_granularity())? };
    reserve(usable, alignment)
}

/// Releases memory obtained from [`reserve`] or [`rebase`].
pub unsafe fn release(
    ptr: *mut std::ffi::c_void,
    size: usize,
    alignment: usize,
) -> std::io::Result<()> {
    let layout = page_layout(size, alignment)?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// Growth only succeeds within the page slack of the existing block.
pub unsafe fn extend_in_place(
    _ptr: *mut std::ffi::c_void,
    old_size: usize,
    new_size: usize,
) -> bool {
    let page_size = get_page_size();
    match crate::align::checked_align_up(old_size.max(1), page_size) {
        Some(committed) => new_size <= committed,
        None => false,
    }
}

/// Allocates `size` zeroed bytes from the global allocator.
pub fn heap_allocate(size: usize, alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    let layout = heap_layout(size, alignment)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }
    Ok(ptr as *mut std::ffi::c_void)
}

/// Returns memory obtained from [`heap_allocate`].
pub unsafe fn heap_free(
    ptr: *mut std::ffi::c_void,
    size: usize,
    alignment: usize,
) -> std::io::Result<()> {
    let layout = heap_layout(size, alignment)?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// The global allocator has no non-moving growth.
pub unsafe fn heap_grow_in_place(
    _ptr: *mut std::ffi::c_void,
    _old_size: usize,
    _new_size: usize,
) -> bool {
    false
}

/// Returns the "standard page" size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}

/// Returns the emulated reservation granularity.
pub fn get_granularity() -> usize {
    get_page_size()
}

fn page_layout(size: usize, alignment: usize) -> std::io::Result<Layout> {
    let page_size = get_page_size();
    let capacity = crate::align::checked_align_up(size.max(1), page_size)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::OutOfMemory, "Invalid layout"))?;
    Layout::from_size_align(capacity, alignment.max(page_size))
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))
}

fn heap_layout(size: usize, alignment: usize) -> std::io::Result<Layout> {
    Layout::from_size_align(size.max(1), alignment.max(1))
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))
}
