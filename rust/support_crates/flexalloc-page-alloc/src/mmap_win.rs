use std::sync::OnceLock;
use windows_sys::Win32::{
    Foundation::GetLastError,
    System::{
        Memory::{
            GetProcessHeap, HEAP_REALLOC_IN_PLACE_ONLY, HEAP_ZERO_MEMORY, HeapAlloc, HeapFree,
            HeapReAlloc, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc,
            VirtualFree,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

/// Largest alignment the process heap guarantees (`MEMORY_ALLOCATION_ALIGNMENT`).
const HEAP_ALIGNMENT: usize = 2 * std::mem::size_of::<usize>();

/// Reserves and commits `size` bytes via `VirtualAlloc`.
///
/// The returned address is aligned to the allocation granularity
/// ([`get_granularity`], typically 64KB), and the region is rounded up to the
/// nearest page boundary. Memory is zero-filled.
///
/// # Safety
///
/// The returned pointer must be released with [`release`].
pub fn reserve(size: usize, _alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    let capacity = round_to_pages(size)?;
    unsafe {
        let ptr = VirtualAlloc(
            std::ptr::null(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
        log::trace!("VirtualAlloc({capacity}) -> {ptr:?}");
        Ok(ptr)
    }
}

/// Turns an over-sized reservation into one that starts at `aligned`.
///
/// Windows can only release a region as a whole, so the original region is freed
/// and `usable` bytes are reserved again exactly at `aligned`. Another thread may
/// grab the range in between, in which case this fails and the caller may retry
/// with a fresh reservation.
///
/// # Errors
///
/// On failure the whole `raw` region has already been released.
///
/// # Safety
///
/// `raw` must be a live region produced by [`reserve`], and `aligned` must be a
/// granularity-aligned address inside it.
pub unsafe fn rebase(
    raw: *mut std::ffi::c_void,
    total: usize,
    aligned: usize,
    usable: usize,
    _alignment: usize,
) -> std::io::Result<*mut std::ffi::c_void> {
    debug_assert_eq!(aligned + usable, raw as usize + total);
    unsafe {
        if raw as usize == aligned {
            return Ok(raw);
        }
        release(raw, total, 0)?;
        let ptr = VirtualAlloc(
            aligned as *const std::ffi::c_void,
            round_to_pages(usable)?,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
        debug_assert_eq!(ptr as usize, aligned);
        Ok(ptr)
    }
}

/// Releases a region produced by [`reserve`] or [`rebase`].
///
/// # Safety
///
/// - `ptr` must be the base address of a live region
/// - No references into the region may outlive this call
pub unsafe fn release(
    ptr: *mut std::ffi::c_void,
    _size: usize,
    _alignment: usize,
) -> std::io::Result<()> {
    unsafe {
        let result = VirtualFree(ptr, 0, MEM_RELEASE);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    log::trace!("VirtualFree({ptr:?})");
    Ok(())
}

/// Attempts to grow a region without moving it.
///
/// A committed region cannot be extended past its reservation, so growth only
/// succeeds within the page slack of the existing region.
///
/// # Safety
///
/// `ptr` and `old_size` must describe a live region produced by [`reserve`] or
/// [`rebase`].
pub unsafe fn extend_in_place(
    ptr: *mut std::ffi::c_void,
    old_size: usize,
    new_size: usize,
) -> bool {
    let _ = ptr;
    match round_to_pages(old_size) {
        Ok(committed) => new_size <= committed,
        Err(_) => false,
    }
}

/// Allocates `size` zeroed bytes from the process heap.
///
/// # Errors
///
/// Fails with `InvalidInput` if `alignment` exceeds what the process heap
/// guarantees, and with `OutOfMemory` if the heap cannot satisfy the request.
pub fn heap_allocate(size: usize, alignment: usize) -> std::io::Result<*mut std::ffi::c_void> {
    if alignment > HEAP_ALIGNMENT {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "alignment exceeds the process heap guarantee",
        ));
    }
    unsafe {
        let heap = GetProcessHeap();
        let ptr = HeapAlloc(heap, HEAP_ZERO_MEMORY, size.max(1));
        if ptr.is_null() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "HeapAlloc failed",
            ));
        }
        Ok(ptr)
    }
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
    unsafe {
        let result = HeapFree(GetProcessHeap(), 0, ptr);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Attempts to grow a heap block without moving it, using
/// `HEAP_REALLOC_IN_PLACE_ONLY`. The heap zeroes the bytes past the old size.
///
/// # Safety
///
/// `ptr` must come from [`heap_allocate`] and must not have been freed.
pub unsafe fn heap_grow_in_place(
    ptr: *mut std::ffi::c_void,
    _old_size: usize,
    new_size: usize,
) -> bool {
    unsafe {
        let new_ptr = HeapReAlloc(
            GetProcessHeap(),
            HEAP_REALLOC_IN_PLACE_ONLY | HEAP_ZERO_MEMORY,
            ptr,
            new_size,
        );
        debug_assert!(new_ptr.is_null() || new_ptr == ptr);
        !new_ptr.is_null()
    }
}

/// Gets the system's standard page size in bytes.
///
/// The value is cached after the first call.
pub fn get_page_size() -> usize {
    system_info().0
}

/// Gets the allocation granularity: the alignment of every address returned by
/// `VirtualAlloc` (typically 64KB).
///
/// The value is cached after the first call.
pub fn get_granularity() -> usize {
    system_info().1
}

fn system_info() -> (usize, usize) {
    static INFO: OnceLock<(usize, usize)> = OnceLock::new();

    *INFO.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        (
            system_info.dwPageSize as usize,
            system_info.dwAllocationGranularity as usize,
        )
    })
}

fn round_to_pages(size: usize) -> std::io::Result<usize> {
    let page_size = get_page_size();
    assert!(page_size.is_power_of_two());
    crate::align::checked_align_up(size.max(1), page_size).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::OutOfMemory, "size overflows address space")
    })
}
