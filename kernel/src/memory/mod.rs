//! Memory management orchestration: heap, frame allocator, Sv39 address
//! spaces, and the demand-paging subsystem.

pub mod frame;
pub mod heap;
pub mod paging;
pub mod paging_state;
pub mod swap;
pub mod swap_io;

#[cfg(test)]
pub mod test_support;
#[cfg(test)]
mod e2e_tests;

pub use paging::AddressSpace;
pub use paging_state::ReplacementPolicy;
pub use swap::PagingState;

use core::sync::atomic::{AtomicU64, Ordering};

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: u32 = 12;

/// Residency cap: the maximum number of physical frames a process may hold
/// at once under the demand-paging subsystem.
pub const MAX_PSYC_PAGES: usize = 16;

/// Total virtual pages per process subject to paging; indices 0..3 are
/// reserved for the initial process image (text/data/guard) and are never
/// chosen as eviction victims.
pub const MAX_TOTAL_PAGES: usize = 32;

static DIRECT_MAP_OFFSET: AtomicU64 = AtomicU64::new(0);
static TOTAL_PHYS_MEMORY: AtomicU64 = AtomicU64::new(0);

/// Records the kernel's fixed direct-map offset (this target's analogue of
/// the Limine HHDM response) so `phys_to_virt`/`virt_to_phys` can translate
/// without a page-table walk.
pub fn set_direct_map_offset(offset: u64) {
    DIRECT_MAP_OFFSET.store(offset, Ordering::SeqCst);
}

pub fn direct_map_offset() -> u64 {
    DIRECT_MAP_OFFSET.load(Ordering::Relaxed)
}

pub fn set_total_physical_memory(bytes: u64) {
    TOTAL_PHYS_MEMORY.store(bytes, Ordering::SeqCst);
}

pub fn total_physical_memory() -> u64 {
    TOTAL_PHYS_MEMORY.load(Ordering::Relaxed)
}

pub fn phys_to_virt(phys: u64) -> u64 {
    phys + direct_map_offset()
}

pub fn virt_to_phys(virt: u64) -> u64 {
    virt - direct_map_offset()
}

/// Picks a heap size proportional to total RAM, clamped to [64 MiB, 512 MiB],
/// mirroring the ratio a desktop-class kernel in this corpus reserves before
/// the frame allocator takes over the rest.
pub fn compute_heap_size(total_phys: u64) -> u64 {
    const MIN_HEAP: u64 = 64 * 1024 * 1024;
    const MAX_HEAP: u64 = 512 * 1024 * 1024;
    ((total_phys / 4).clamp(MIN_HEAP, MAX_HEAP)) & !(PAGE_SIZE as u64 - 1)
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub total_frames: u64,
    pub used_frames: u64,
    pub total_phys: u64,
}

pub fn stats() -> MemoryStats {
    let (total_frames, used_frames) = frame::stats();
    MemoryStats {
        total_frames,
        used_frames,
        total_phys: total_physical_memory(),
    }
}
