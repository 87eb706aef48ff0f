//! Host-only scaffolding for tests that exercise real pointer-dereferencing
//! paging code — `AddressSpace::walk`, `page_out`/`swap_in`'s copies through
//! `phys_to_virt` — rather than just the `PageMeta`/queue bookkeeping around
//! them.
//!
//! The trick: point the frame allocator's `base_phys` at the actual address
//! of a heap-backed buffer this process owns, and set the direct-map offset
//! to zero. `phys_to_virt` then hands back the same address the allocator
//! handed out, which is a perfectly valid host pointer into that buffer —
//! no different in kind from how the real kernel's HHDM offset makes a
//! physical address dereferenceable, just identity instead of an offset.

use alloc::vec::Vec;

use super::{frame, PAGE_SIZE};

/// Backing storage for a test's "physical memory." Must be kept alive for
/// as long as any `AddressSpace`/frame allocated from it might still be
/// dereferenced.
pub struct HostMemory {
    _backing: Vec<u8>,
}

/// Installs a `total_frames`-frame pool backed by a real allocation and
/// resets the direct-map offset to identity. Call once per test before
/// constructing any `AddressSpace` or touching `frame::alloc_frame`.
pub fn install(total_frames: usize) -> HostMemory {
    // One spare page so the aligned base always has `total_frames` full
    // pages left in front of it regardless of the allocator's own alignment.
    let mut backing = alloc::vec![0u8; (total_frames + 1) * PAGE_SIZE];
    let raw = backing.as_mut_ptr() as u64;
    let base = (raw + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1);

    super::set_direct_map_offset(0);
    frame::install_test_pool(base, total_frames);

    HostMemory { _backing: backing }
}
