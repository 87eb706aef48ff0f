//! The demand-paging core: per-process paging state, the swap-in/swap-out
//! protocol, the address-space growth hook, and the fork/unmap/fault/
//! scheduler entry points that drive it.

use super::frame;
use super::paging::{deep_copy_user_range, pte_flags, AddressSpace};
use super::paging_state::{PageMeta, ReplacementPolicy, ResidentQueue};
use super::swap_io::SwapFile;
use super::{MAX_PSYC_PAGES, MAX_TOTAL_PAGES, PAGE_SHIFT, PAGE_SIZE};

/// Everything demand-paging needs about one process: the residency table,
/// the SCFIFO-ordering queue, the scalar mirror of the table's `in_use`
/// count, the process's swap-file handle, and its selected policy.
///
/// Absent (`None`) for the two always-resident system processes (pid ≤ 1),
/// whose pages are never paged out — see `uvm_alloc`.
pub struct PagingState {
    pub table: [PageMeta; MAX_TOTAL_PAGES],
    pub queue: ResidentQueue,
    pub pages_in_memory: usize,
    pub swap: SwapFile,
    pub policy: ReplacementPolicy,
}

impl PagingState {
    pub fn new(swap: SwapFile, policy: ReplacementPolicy) -> Self {
        Self {
            table: [PageMeta::unallocated(); MAX_TOTAL_PAGES],
            queue: ResidentQueue::new(),
            pages_in_memory: 0,
            swap,
            policy,
        }
    }

    /// First offset in `[0, process_size)` not held by any slot's `offset`
    /// field. O(n²) by construction (performed only on eviction) — see
    /// DESIGN.md for the "no slot" signal this resolves an ambiguity in
    /// favor of, rather than silently returning offset 0.
    pub fn next_free_offset(&self, process_size: usize) -> Option<usize> {
        let mut offset = 0usize;
        while offset < process_size {
            if !self.table.iter().any(|m| m.offset == offset as i64) {
                return Some(offset);
            }
            offset += PAGE_SIZE;
        }
        None
    }
}

fn va_of(index: usize) -> u64 {
    (index << PAGE_SHIFT) as u64
}

fn index_of(va: u64) -> usize {
    (va >> PAGE_SHIFT) as usize
}

/// Moves the policy's chosen victim page out to `offset` in the swap file.
///
/// Fatal (panics) on swap-write failure, matching §7: the process cannot
/// safely continue once a victim's only copy might be lost.
pub fn page_out(paging: &mut PagingState, address_space: &mut AddressSpace, offset: usize) {
    let victim = paging
        .policy
        .select_victim(&paging.table, &mut paging.queue, address_space);

    let va = va_of(victim);
    let pte_ptr = address_space
        .walk(va, false)
        .expect("page_out: victim has no page-table entry");
    let pte = unsafe { &mut *pte_ptr };
    let phys = pte.phys_addr();
    let preserved_flags = pte.flags() & !(pte_flags::VALID | pte_flags::PAGED_OUT);

    let mut buf = [0u8; PAGE_SIZE];
    unsafe {
        core::ptr::copy_nonoverlapping(
            super::phys_to_virt(phys) as *const u8,
            buf.as_mut_ptr(),
            PAGE_SIZE,
        );
    }
    if paging.swap.write(&buf, offset) < 0 {
        panic!("page_out: swap write failed at offset {offset}");
    }

    frame::free_frame(phys);
    pte.set(0, preserved_flags | pte_flags::PAGED_OUT);

    paging.table[victim].in_use = false;
    paging.table[victim].offset = offset as i64;
    paging.pages_in_memory -= 1;

    // SCFIFO's selector already dequeued the victim; NFUA/LAPA never touch
    // the queue during selection, so it's still present here.
    if matches!(paging.policy, ReplacementPolicy::Nfua | ReplacementPolicy::Lapa) {
        paging.queue.remove(victim);
    }

    crate::arch::current::memory::flush_tlb(va);
}

/// Brings the faulting page back into residency, evicting another page
/// first if the process is already at its physical cap.
///
/// Fatal conditions (panic, per §7): the fault lands on a slot with no
/// on-disk copy (`offset == -1`), or frame allocation fails.
pub fn swap_in(paging: &mut PagingState, address_space: &mut AddressSpace, fault_va: u64) {
    let i = index_of(fault_va);
    let offset = paging.table[i].offset;
    assert!(offset >= 0, "swap_in: fault on page {i} with no swap copy");

    let phys = frame::alloc_frame().expect("swap_in: out of physical frames");

    let mut buf = [0u8; PAGE_SIZE];
    if paging.swap.read(&mut buf, offset as usize) < 0 {
        panic!("swap_in: swap read failed at offset {offset}");
    }

    if paging.pages_in_memory >= MAX_PSYC_PAGES {
        page_out(paging, address_space, offset as usize);
    }

    unsafe {
        core::ptr::copy_nonoverlapping(
            buf.as_ptr(),
            super::phys_to_virt(phys) as *mut u8,
            PAGE_SIZE,
        );
    }

    let va = va_of(i);
    let pte_ptr = address_space
        .walk(va, false)
        .expect("swap_in: faulting page has no page-table entry");
    let pte = unsafe { &mut *pte_ptr };
    let preserved_flags = pte.flags() & !(pte_flags::VALID | pte_flags::PAGED_OUT);
    pte.set(phys, preserved_flags | pte_flags::VALID);

    paging.table[i].aging_counter = paging.policy.init_aging();
    paging.table[i].offset = -1;
    paging.table[i].in_use = true;
    paging.pages_in_memory += 1;
    paging.queue.enqueue(i);

    crate::arch::current::memory::flush_tlb(va);
}

/// Called by the trap dispatcher once it has classified a fault as a
/// paged-out access.
pub fn handle_page_fault(paging: &mut PagingState, address_space: &mut AddressSpace, fault_va: u64) {
    swap_in(paging, address_space, fault_va);
}

/// Called by the scheduler immediately before resuming this process.
pub fn age_tick(paging: &mut PagingState, address_space: &mut AddressSpace) {
    paging.policy.age_tick(&mut paging.table, address_space);
}

/// Grows a user address space from `old_sz` to `new_sz`. `paging == None`
/// marks the pid ≤ 1 system-process path: pages are allocated and mapped
/// without ever touching swap state.
///
/// Returns `new_sz` on success, `0` on failure (the address space is
/// rolled back to `old_sz` first).
pub fn uvm_alloc(
    address_space: &mut AddressSpace,
    mut paging: Option<&mut PagingState>,
    old_sz: u64,
    new_sz: u64,
) -> u64 {
    let perm = pte_flags::READ | pte_flags::WRITE | pte_flags::USER;
    let mut va = old_sz;
    while va < new_sz {
        match paging.as_deref_mut() {
            None => match frame::alloc_frame_zeroed() {
                Some(phys) => {
                    if address_space.map_page(va, phys, perm).is_err() {
                        frame::free_frame(phys);
                        uvm_dealloc(address_space, None, va, old_sz);
                        return 0;
                    }
                }
                None => {
                    uvm_dealloc(address_space, None, va, old_sz);
                    return 0;
                }
            },
            Some(paging) => {
                let index = index_of(va);
                if index >= MAX_TOTAL_PAGES {
                    uvm_dealloc(address_space, Some(paging), va, old_sz);
                    return 0;
                }

                if paging.pages_in_memory >= MAX_PSYC_PAGES {
                    let offset = paging
                        .next_free_offset(new_sz as usize)
                        .expect("uvm_alloc: no free swap offset despite room under the cap");
                    page_out(paging, address_space, offset);
                }

                let Some(phys) = frame::alloc_frame_zeroed() else {
                    uvm_dealloc(address_space, Some(paging), va, old_sz);
                    return 0;
                };
                if address_space.map_page(va, phys, perm).is_err() {
                    frame::free_frame(phys);
                    uvm_dealloc(address_space, Some(paging), va, old_sz);
                    return 0;
                }

                paging.table[index].in_use = true;
                paging.table[index].offset = -1;
                paging.table[index].aging_counter = paging.policy.init_aging();
                paging.pages_in_memory += 1;
                paging.queue.enqueue(index);
            }
        }
        va += PAGE_SIZE as u64;
    }
    new_sz
}

/// Shrinks a user address space from `old_sz` down to `new_sz`, freeing
/// every page in between through the same bookkeeping as `unmap`.
pub fn uvm_dealloc(
    address_space: &mut AddressSpace,
    paging: Option<&mut PagingState>,
    old_sz: u64,
    new_sz: u64,
) -> u64 {
    if new_sz >= old_sz {
        return old_sz;
    }
    let npages = (old_sz - new_sz) as usize / PAGE_SIZE;
    uvm_unmap(address_space, paging, new_sz, npages, true);
    new_sz
}

/// Unmaps `npages` pages starting at `va`. A PTE that is already absent
/// (never allocated) is silently skipped, allowing sparse ranges to be
/// torn down idempotently.
pub fn uvm_unmap(
    address_space: &mut AddressSpace,
    mut paging: Option<&mut PagingState>,
    va: u64,
    npages: usize,
    free_frames: bool,
) {
    assert_eq!(va % PAGE_SIZE as u64, 0, "uvm_unmap: unaligned VA");
    for page in 0..npages {
        let page_va = va + (page * PAGE_SIZE) as u64;
        let Some(pte_ptr) = address_space.walk(page_va, false) else {
            continue;
        };
        let pte = unsafe { &mut *pte_ptr };

        if pte.is_valid() {
            if free_frames {
                frame::free_frame(pte.phys_addr());
            }
            if let Some(paging) = paging.as_deref_mut() {
                let index = index_of(page_va);
                paging.table[index].in_use = false;
                paging.table[index].offset = -1;
                paging.pages_in_memory -= 1;
                paging.queue.remove(index);
            }
        } else if pte.is_paged_out() {
            if let Some(paging) = paging.as_deref_mut() {
                paging.table[index_of(page_va)].offset = -1;
            }
        } else {
            continue;
        }
        pte.clear();
    }
}

/// Deep-copies a parent's address space, paging table, resident queue, and
/// swap file into a freshly created child — the §4.7 fork contract.
///
/// See DESIGN.md for the Open Question resolution: the swap file is copied
/// byte-for-byte in full rather than only at offsets the parent's table
/// currently references.
pub fn uvm_copy(
    parent_as: &mut AddressSpace,
    parent_paging: Option<&PagingState>,
    child_as: &mut AddressSpace,
    child_paging: Option<&mut PagingState>,
    sz: u64,
) -> Result<(), &'static str> {
    let max_pages = (sz as usize / PAGE_SIZE).min(MAX_TOTAL_PAGES) as u64;
    deep_copy_user_range(parent_as, child_as, max_pages)?;

    if let (Some(parent), Some(child)) = (parent_paging, child_paging) {
        child.table = parent.table;
        child.pages_in_memory = parent.pages_in_memory;
        child.policy = parent.policy;
        child.queue = ResidentQueue::new();
        for i in 0..MAX_TOTAL_PAGES {
            if child.table[i].in_use {
                child.queue.enqueue(i);
            }
        }
        parent.swap.clone_into(&child.swap)?;
    }
    Ok(())
}
