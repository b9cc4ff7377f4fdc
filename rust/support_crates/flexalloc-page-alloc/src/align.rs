//! Address arithmetic for power-of-two boundaries.

/// Rounds an address or size up to the next multiple of `alignment`.
///
/// Values that are already aligned are returned unchanged.
///
/// # Examples
///
/// ```
/// use flexalloc_page_alloc::align::align_up;
///
/// assert_eq!(align_up(0, 16), 0);
/// assert_eq!(align_up(1, 16), 16);
/// assert_eq!(align_up(16, 16), 16);
/// assert_eq!(align_up(0x1001, 0x1000), 0x2000);
/// ```
///
/// # Panics
///
/// Panics in debug builds if `alignment` is not a power of two, or if the
/// result does not fit in `usize`.
#[inline]
pub fn align_up(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}

/// Rounds an address or size up to the next multiple of `alignment`, returning
/// `None` on overflow.
#[inline]
pub fn checked_align_up(n: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    Some(n.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Rounds an address or size down to the previous multiple of `alignment`.
///
/// # Examples
///
/// ```
/// use flexalloc_page_alloc::align::align_down;
///
/// assert_eq!(align_down(0, 16), 0);
/// assert_eq!(align_down(15, 16), 0);
/// assert_eq!(align_down(17, 16), 16);
/// assert_eq!(align_down(0x2fff, 0x1000), 0x2000);
/// ```
#[inline]
pub fn align_down(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    n & !(alignment - 1)
}

/// Checks whether `n` lies exactly on an `alignment` boundary.
#[inline]
pub fn is_aligned(n: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_down_agree() {
        for shift in 0..16 {
            let alignment = 1usize << shift;
            for n in [0usize, 1, 7, 4095, 4096, 65537, 1 << 20] {
                let up = align_up(n, alignment);
                let down = align_down(n, alignment);
                assert!(is_aligned(up, alignment));
                assert!(is_aligned(down, alignment));
                assert!(down <= n && n <= up);
                assert!(up - down == 0 || up - down == alignment);
                assert_eq!(checked_align_up(n, alignment), Some(up));
            }
        }
    }

    #[test]
    fn test_checked_align_up_overflow() {
        assert_eq!(checked_align_up(usize::MAX, 2), None);
        assert_eq!(checked_align_up(usize::MAX - 4095, 4096), Some(usize::MAX - 4095));
    }
}
