use anyhow::{Result, bail};
use flexalloc_page_alloc::{allocate, deallocate, try_expand};

/// Runs the allocator checks, printing one line per check.
pub fn run(size: usize, alignment: usize) -> Result<()> {
    println!("Running allocator checks...");

    let checks: [(&str, fn(usize, usize) -> bool); 3] = [
        ("allocate", check_allocate),
        ("deallocate", check_deallocate),
        ("try_expand", check_try_expand),
    ];

    let mut failed = 0;
    for (name, check) in checks {
        if check(size, alignment) {
            println!("{name}: PASSED");
        } else {
            println!("{name}: FAILED");
            failed += 1;
        }
    }

    println!("Allocator checks completed.");
    if failed != 0 {
        bail!("{failed} allocator check(s) failed");
    }
    Ok(())
}

fn check_allocate(size: usize, alignment: usize) -> bool {
    let block = allocate(size, alignment);
    let ok = !block.is_empty() && block.size() >= size && block.is_aligned(alignment);
    unsafe { deallocate(block, alignment) };
    ok
}

/// Memory released by `deallocate` must be obtainable again.
fn check_deallocate(size: usize, alignment: usize) -> bool {
    let block = allocate(size, alignment);
    if block.is_empty() {
        log::warn!("allocation of {size} bytes failed");
        return false;
    }
    unsafe { deallocate(block, alignment) };

    let again = allocate(size, alignment);
    let ok = !again.is_empty() && again.size() >= size;
    unsafe { deallocate(again, alignment) };
    ok
}

fn check_try_expand(size: usize, alignment: usize) -> bool {
    let mut block = allocate(size, alignment);
    if block.is_empty() {
        log::warn!("allocation of {size} bytes failed");
        return false;
    }
    let new_size = size.saturating_mul(2);
    let ok = unsafe { try_expand(&mut block, new_size) } && block.size() >= new_size;
    unsafe { deallocate(block, alignment) };
    ok
}
