use std::sync::OnceLock;

/// Reserves and commits `size` bytes of anonymous, zero-filled memory via mmap.
///
/// The returned address is aligned to [`get_granularity`], and the mapping is
/// rounded up to the nearest page boundary.
///
/// # Arguments
///
/// * `size` - The number of bytes to reserve. Zero is treated as one byte.
/// * `_alignment` - Ignored: mmap already returns page-aligned memory, and
///   stricter alignments are produced by [`rebase`].
///
/// # Returns
///
/// The address of the mapping, or the `io::Error` reported by the kernel.
///
/// # Safety
///
/// The returned pointer must be released with [`release`], passing a size whose
/// page-rounded value matches the mapping.
pub fn reserve(size: usize, _alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    let capacity = round_to_pages(size)?;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    log::trace!("mmap({capacity}) -> {ptr:?}");
    Ok(ptr)
}

/// Turns an over-sized reservation into one that starts at `aligned`.
///
/// `raw` is a mapping of `total` bytes returned by [`reserve`], and `aligned` is a
/// page-aligned address inside it, with `usable` bytes between `aligned` and the
/// end of the original request. The pages in `[raw, aligned)` are unmapped, after
/// which `aligned` is the start of its own mapping and can be released exactly.
///
/// # Errors
///
/// On failure the whole `raw` mapping has already been released.
///
/// # Safety
///
/// `raw` and `total` must describe a live mapping produced by [`reserve`], and
/// `aligned` must be page-aligned with `raw <= aligned < raw + total`.
pub unsafe fn rebase(
    raw: *mut std::ffi::c_void,
    total: usize,
    aligned: usize,
    usable: usize,
    _alignment: usize,
) -> std::io::Result<*mut std::ffi::c_void> {
    let head = aligned - raw as usize;
    debug_assert_eq!(head % get_page_size(), 0);
    debug_assert_eq!(aligned + usable, raw as usize + total);
    if head != 0 {
        let res = unsafe { libc::munmap(raw, head) };
        if res < 0 {
            let err = std::io::Error::last_os_error();
            let _ = unsafe { release(raw, total, 0) };
            return Err(err);
        }
    }
    Ok(aligned as *mut std::ffi::c_void)
}

/// Releases a mapping produced by [`reserve`] or [`rebase`].
///
/// # Safety
///
/// - `ptr` must be the start of a live mapping
/// - `size` must round up to the same number of pages as that mapping
/// - No references into the mapping may outlive this call
pub unsafe fn release(
    ptr: *mut std::ffi::c_void,
    size: usize,
    _alignment: usize,
) -> std::io::Result<()> {
    let capacity = round_to_pages(size)?;
    let res = unsafe { libc::munmap(ptr, capacity) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    log::trace!("munmap({ptr:?}, {capacity})");
    Ok(())
}

/// Attempts to grow a mapping without moving it.
///
/// Growth that fits in the page slack of the existing mapping always succeeds. On
/// Linux, larger growth is attempted with `mremap` without `MREMAP_MAYMOVE`, which
/// only succeeds when the address range right after the mapping is free.
///
/// # Safety
///
/// `ptr` and `old_size` must describe a live mapping produced by [`reserve`] or
/// [`rebase`].
pub unsafe fn extend_in_place(
    ptr: *mut std::ffi::c_void,
    old_size: usize,
    new_size: usize,
) -> bool {
    let Ok(committed) = round_to_pages(old_size) else {
        return false;
    };
    if new_size <= committed {
        return true;
    }

    #[cfg(target_os = "linux")]
    {
        let Ok(new_capacity) = round_to_pages(new_size) else {
            return false;
        };
        let res = unsafe { libc::mremap(ptr, committed, new_capacity, 0) };
        if res == libc::MAP_FAILED {
            log::trace!(
                "mremap({ptr:?}, {committed}, {new_capacity}) failed: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        debug_assert_eq!(res, ptr);
        true
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = ptr;
        false
    }
}

/// Allocates `size` zeroed bytes from the C heap with the requested alignment.
///
/// # Errors
///
/// Returns the error code reported by `posix_memalign` (`ENOMEM` or `EINVAL`).
pub fn heap_allocate(size: usize, alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    let alignment = alignment.max(std::mem::size_of::<usize>());
    let size = size.max(1);
    let mut ptr: *mut std::ffi::c_void = std::ptr::null_mut();
    let res = unsafe { libc::posix_memalign(&mut ptr, alignment, size) };
    if res != 0 {
        return Err(std::io::Error::from_raw_os_error(res));
    }
    unsafe { (ptr as *mut u8).write_bytes(0, size) };
    Ok(ptr)
}

/// Returns heap memory obtained from [`heap_allocate`].
///
/// # Safety
///
/// `ptr` must come from [`heap_allocate`] and must not have been freed.
pub unsafe fn heap_free(
    ptr: *mut std::ffi::c_void,
    _size: usize,
    _alignment: usize,
) -> std::io::Result<()> {
    unsafe { libc::free(ptr) };
    Ok(())
}

/// Attempts to grow a heap block without moving it.
///
/// With glibc this succeeds whenever the allocator already handed out at least
/// `new_size` usable bytes for the block; the bytes past `old_size` are zeroed.
/// Elsewhere the C heap offers no non-moving growth and the call always fails.
///
/// # Safety
///
/// `ptr` must come from [`heap_allocate`] and must not have been freed.
pub unsafe fn heap_grow_in_place(
    ptr: *mut std::ffi::c_void,
    old_size: usize,
    new_size: usize,
) -> bool {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        if unsafe { libc::malloc_usable_size(ptr) } < new_size {
            return false;
        }
        if new_size > old_size {
            unsafe { (ptr as *mut u8).add(old_size).write_bytes(0, new_size - old_size) };
        }
        true
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    {
        let _ = (ptr, old_size, new_size);
        false
    }
}

/// Gets the system's standard page size in bytes.
///
/// The value is cached after the first call. If `sysconf(_SC_PAGESIZE)` fails, a
/// default of 4KB is returned.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    if let Some(&size) = SIZE.get() {
        size
    } else {
        match read_page_size() {
            Ok(size) => {
                let _ = SIZE.set(size);
                size
            }
            Err(_) => 4 * 1024,
        }
    }
}

/// Gets the alignment that every [`reserve`] result is guaranteed to satisfy.
///
/// On POSIX systems mmap places mappings on page boundaries, so this is the page
/// size.
pub fn get_granularity() -> usize {
    get_page_size()
}

fn round_to_pages(size: usize) -> std::io::Result<usize> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    crate::align::checked_align_up(size.max(1), page_size).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::OutOfMemory, "size overflows address space")
    })
}

/// Reads the standard page size from the system using sysconf.
fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
