use anyhow::Result;
use flexalloc_page_alloc::{mmap, page_granularity};

use crate::utils::format_size;

pub fn run() -> Result<()> {
    let page_size = mmap::get_page_size();
    let granularity = page_granularity();
    println!("Page size:            {page_size} ({})", format_size(page_size as u64));
    println!(
        "Native granularity:   {granularity} ({})",
        format_size(granularity as u64)
    );
    Ok(())
}
