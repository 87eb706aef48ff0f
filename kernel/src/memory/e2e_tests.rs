//! End-to-end demand-paging scenarios, driven directly against
//! `AddressSpace`/`PagingState` rather than through a booted kernel — see
//! `test_support` for how "physical memory" becomes dereferenceable here.
//!
//! Each test plays the role of the fault handler and scheduler tick by hand
//! (`read_byte` swaps a page in on demand; `AddressSpace::touch` stands in
//! for the MMU setting the accessed bit), since nothing here runs under a
//! real trap.

use super::paging::AddressSpace;
use super::paging_state::{PageMeta, RESERVED_INDICES};
use super::swap::{self, PagingState};
use super::swap_io::SwapFile;
use super::{test_support, ReplacementPolicy, MAX_PSYC_PAGES, MAX_TOTAL_PAGES, PAGE_SIZE};

/// Generous frame pool for tests that don't care about exact exhaustion:
/// a root + a couple of intermediate tables for each of two address spaces,
/// plus every page either scenario could ever hold resident at once.
const AMPLE_FRAMES: usize = 256;

fn fresh_process(policy: ReplacementPolicy, swap_lba: u64) -> (AddressSpace, PagingState) {
    let address_space = AddressSpace::new().expect("test pool exhausted allocating root table");
    let swap = SwapFile::new(swap_lba, MAX_TOTAL_PAGES, 7);
    let paging = PagingState::new(swap, policy);
    (address_space, paging)
}

fn write_byte(address_space: &mut AddressSpace, va: u64, value: u8) {
    let phys = address_space.translate(va).expect("write_byte: va not resident");
    unsafe {
        *(super::phys_to_virt(phys) as *mut u8) = value;
    }
}

/// Reads the first byte of the page at `va`, swapping it in first if it's
/// currently on disk — playing the role of the trap dispatcher.
fn read_byte(paging: &mut PagingState, address_space: &mut AddressSpace, va: u64) -> u8 {
    let index = (va / PAGE_SIZE as u64) as usize;
    if !paging.table[index].in_use {
        swap::handle_page_fault(paging, address_space, va);
    }
    let phys = address_space.translate(va).expect("read_byte: va not resident after fault");
    unsafe { *(super::phys_to_virt(phys) as *const u8) }
}

fn grow(address_space: &mut AddressSpace, paging: &mut PagingState, old_sz: u64, new_sz: u64) -> u64 {
    swap::uvm_alloc(address_space, Some(paging), old_sz, new_sz)
}

/// Scenario 1 (§8): allocate 20 pages, write byte `i` into page `i`, read
/// every page back and confirm round-trip — exercising at least four
/// evictions given the 16-page cap.
#[test]
fn sanity_20_pages_round_trip() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let count = 20u64;
    let mut evictions = 0usize;
    for i in 0..count {
        let old_sz = base + i * PAGE_SIZE as u64;
        let new_sz = old_sz + PAGE_SIZE as u64;
        let before = paging.pages_in_memory;
        let result = grow(&mut address_space, &mut paging, old_sz, new_sz);
        assert_eq!(result, new_sz, "growth step {i} should succeed");
        if paging.pages_in_memory <= before {
            evictions += 1;
        }
        write_byte(&mut address_space, old_sz, i as u8);
    }
    assert!(evictions >= 4, "expected at least 4 evictions, saw {evictions}");
    assert!(paging.pages_in_memory <= MAX_PSYC_PAGES);

    for i in 0..count {
        let va = base + i * PAGE_SIZE as u64;
        assert_eq!(read_byte(&mut paging, &mut address_space, va), i as u8, "page {i} mismatch");
    }
}

/// Scenario 2 (§8), NFUA half: the page touched only in the first warm-up
/// phase (lowest aging history) must be the one evicted when a 17th page
/// is allocated.
#[test]
fn nfua_evicts_page_untouched_in_second_phase() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Nfua, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let num = MAX_PSYC_PAGES as u64; // fills the cap exactly, no eviction yet
    let new_sz = base + num * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);

    for i in 0..num {
        address_space.touch(base + i * PAGE_SIZE as u64);
    }
    for _ in 0..3 {
        swap::age_tick(&mut paging, &mut address_space);
    }

    // Touch all but the last page in this second warm-up phase.
    for i in 0..num - 1 {
        address_space.touch(base + i * PAGE_SIZE as u64);
    }
    for _ in 0..3 {
        swap::age_tick(&mut paging, &mut address_space);
    }

    let untouched_index = ((base / PAGE_SIZE as u64) + num - 1) as usize;
    assert!(paging.table[untouched_index].in_use);

    let grown_sz = new_sz + PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, new_sz, grown_sz), grown_sz);

    assert!(
        !paging.table[untouched_index].in_use,
        "NFUA should evict the page not touched after the first sleep"
    );
    assert_eq!(paging.pages_in_memory, MAX_PSYC_PAGES);
}

/// Scenario 2 (§8), LAPA half: with `init_aging = 0xFFFFFFFF`, a page
/// touched in both warm-up phases must survive eviction over one touched
/// only in the first phase.
#[test]
fn lapa_prefers_page_touched_in_both_phases() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Lapa, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let num = MAX_PSYC_PAGES as u64;
    let new_sz = base + num * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);

    for i in 0..num {
        address_space.touch(base + i * PAGE_SIZE as u64);
    }
    for _ in 0..3 {
        swap::age_tick(&mut paging, &mut address_space);
    }
    for i in 0..num - 1 {
        address_space.touch(base + i * PAGE_SIZE as u64);
    }
    for _ in 0..3 {
        swap::age_tick(&mut paging, &mut address_space);
    }

    let both_phases_index = (base / PAGE_SIZE as u64) as usize;
    let first_phase_only_index = ((base / PAGE_SIZE as u64) + num - 1) as usize;

    let grown_sz = new_sz + PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, new_sz, grown_sz), grown_sz);

    assert!(
        paging.table[both_phases_index].in_use,
        "a page touched in both phases must survive eviction"
    );
    assert!(
        !paging.table[first_phase_only_index].in_use,
        "the page touched only in the first phase should be evicted"
    );
}

/// Scenario 3 (§8): SCFIFO gives the first page in the queue a second
/// chance (clearing its accessed bit, moving it to the tail) before
/// evicting the next one in line.
#[test]
fn scfifo_second_chance_skips_accessed_head() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let num = MAX_PSYC_PAGES as u64;
    let new_sz = base + num * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);

    let first_index = (base / PAGE_SIZE as u64) as usize;
    let second_index = first_index + 1;
    address_space.touch(base); // "page 0" gets a second chance

    let grown_sz = new_sz + PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, new_sz, grown_sz), grown_sz);

    assert!(
        paging.table[first_index].in_use,
        "the accessed head page must survive via its second chance"
    );
    assert!(
        !paging.table[second_index].in_use,
        "the next page in FIFO order should be the one evicted"
    );

    // The second-chance page moved to the tail with its accessed bit
    // cleared, so a future scan would not spare it again for free.
    let pte = address_space.walk(base, false).unwrap();
    assert!(!unsafe { (*pte).accessed() });
}

/// Scenario 4 (§8): fork after at least one eviction; the child must read
/// back every page — resident or on-disk — with the parent's pre-fork
/// contents.
#[test]
fn fork_equivalence_across_resident_and_on_disk_pages() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut parent_as, mut parent_paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let count = 17u64;
    let mut values = alloc::vec::Vec::new();
    for i in 0..count {
        let old_sz = base + i * PAGE_SIZE as u64;
        let new_sz = old_sz + PAGE_SIZE as u64;
        assert_eq!(grow(&mut parent_as, &mut parent_paging, old_sz, new_sz), new_sz);
        let value = (i * 13 + 1) as u8;
        write_byte(&mut parent_as, old_sz, value);
        values.push(value);
    }
    assert!(parent_paging.pages_in_memory <= MAX_PSYC_PAGES);
    // At least one page must have been evicted to disk for this to exercise
    // the on-disk half of the fork contract.
    assert!(parent_paging.table[(base / PAGE_SIZE as u64) as usize].offset >= 0);

    let sz = base + count * PAGE_SIZE as u64;
    let mut child_as = AddressSpace::new().expect("child address space");
    let child_swap_lba = MAX_TOTAL_PAGES as u64 * 8;
    let mut child_paging = PagingState::new(SwapFile::new(child_swap_lba, MAX_TOTAL_PAGES, 8), parent_paging.policy);

    swap::uvm_copy(
        &mut parent_as,
        Some(&parent_paging),
        &mut child_as,
        Some(&mut child_paging),
        sz,
    )
    .expect("fork copy should succeed");

    for i in 0..count {
        let va = base + i * PAGE_SIZE as u64;
        let got = read_byte(&mut child_paging, &mut child_as, va);
        assert_eq!(got, values[i as usize], "child page {i} diverged from parent at fork time");
    }
}

/// Scenario 5 (§8): frame allocation fails partway through a 20-page
/// growth from size 0; the address space must roll back to its original
/// size and the call must return 0.
#[test]
fn dealloc_on_growth_failure_rolls_back_to_old_size() {
    // Exactly enough frames for: the root table (1), the first growth
    // step's intermediate tables (2, created once and reused after), and
    // nine page frames — the tenth page's allocation then fails.
    const POOL: usize = 1 + 2 + 9;
    let _mem = test_support::install(POOL);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let old_sz = 0u64;
    let new_sz = 20 * PAGE_SIZE as u64;
    let result = grow(&mut address_space, &mut paging, old_sz, new_sz);

    assert_eq!(result, 0, "growth must report failure");
    assert_eq!(paging.pages_in_memory, 0, "partial growth must be fully unmapped");
    for i in 0..9 {
        let va = i * PAGE_SIZE as u64;
        assert!(address_space.translate(va).is_none(), "page {i} should have been rolled back");
        assert!(!paging.table[i as usize].in_use);
    }
}

/// Scenario 5 (§8), non-zero-`old_sz` case: `uvm_alloc` must return `0` on
/// failure even when growing from an already-nonzero size, not `old_sz`
/// itself — a prior bug returned `uvm_dealloc`'s result (which evaluates to
/// its `new_sz` parameter, i.e. the call's `old_sz`) instead of the literal
/// `0` spec §6 requires.
#[test]
fn dealloc_on_growth_failure_from_nonzero_old_sz_returns_zero() {
    // First growth (3 pages, succeeds): root table (1) + 2 intermediate
    // tables + 3 page frames = 6 frames. Second growth then gets exactly 9
    // more page frames before the 10th page's allocation fails.
    const FIRST_GROWTH_PAGES: u64 = 3;
    const POOL: usize = 1 + 2 + FIRST_GROWTH_PAGES as usize + 9;
    let _mem = test_support::install(POOL);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let old_sz = FIRST_GROWTH_PAGES * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, 0, old_sz), old_sz);

    let new_sz = old_sz + 20 * PAGE_SIZE as u64;
    let result = grow(&mut address_space, &mut paging, old_sz, new_sz);

    assert_eq!(result, 0, "growth must report failure as 0, not old_sz");
    assert_eq!(
        paging.pages_in_memory, FIRST_GROWTH_PAGES as usize,
        "only the first growth's pages should remain resident"
    );
    for i in 0..FIRST_GROWTH_PAGES {
        let va = i * PAGE_SIZE as u64;
        assert!(address_space.translate(va).is_some(), "page {i} from before the failed growth must survive");
        assert!(paging.table[i as usize].in_use);
    }
    for i in FIRST_GROWTH_PAGES..FIRST_GROWTH_PAGES + 9 {
        let va = i * PAGE_SIZE as u64;
        assert!(address_space.translate(va).is_none(), "page {i} should have been rolled back");
        assert!(!paging.table[i as usize].in_use);
    }
}

/// Scenario 6 (§8): evicting page A to offset `o`, faulting it back in,
/// then evicting page B must let B reuse offset `o` — offsets are not
/// monotonically increasing.
#[test]
fn swap_offset_is_reused_after_fault_in() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let num = MAX_PSYC_PAGES as u64;
    let new_sz = base + num * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);

    let a_index = (base / PAGE_SIZE as u64) as usize;

    // Evict A (the SCFIFO head) by growing one more page.
    let after_first_evict = new_sz + PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, new_sz, after_first_evict), after_first_evict);
    assert!(!paging.table[a_index].in_use);
    let a_offset = paging.table[a_index].offset;
    assert!(a_offset >= 0);

    // Fault A back in.
    let _ = read_byte(&mut paging, &mut address_space, base);
    assert!(paging.table[a_index].in_use);
    assert_eq!(paging.table[a_index].offset, -1);

    // Evict again (now at cap once more) and confirm some page's offset
    // equals the one A just vacated — i.e. it was reused, not bumped past.
    let after_second_evict = after_first_evict + PAGE_SIZE as u64;
    assert_eq!(
        grow(&mut address_space, &mut paging, after_first_evict, after_second_evict),
        after_second_evict
    );
    let reused = paging.table.iter().any(|m| !m.in_use && m.offset == a_offset);
    assert!(reused, "offset {a_offset} should have been reused by the next eviction");
}

/// Round-trip law: a page evicted and faulted back in with no intervening
/// write reads back the contents it had at eviction time.
#[test]
fn round_trip_preserves_contents_with_no_intervening_write() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Nfua, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let new_sz = base + PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);
    write_byte(&mut address_space, base, 0xAB);

    // Fill the cap with other pages so the first one becomes a victim.
    let mut sz = new_sz;
    for _ in 0..MAX_PSYC_PAGES {
        let next = sz + PAGE_SIZE as u64;
        assert_eq!(grow(&mut address_space, &mut paging, sz, next), next);
        sz = next;
    }

    let index = (base / PAGE_SIZE as u64) as usize;
    assert!(!paging.table[index].in_use, "the first page should have been evicted by now");
    assert_eq!(read_byte(&mut paging, &mut address_space, base), 0xAB);
}

/// Idempotent unmap: unmapping an already-unmapped range is a no-op.
#[test]
fn unmap_is_idempotent() {
    let _mem = test_support::install(AMPLE_FRAMES);
    crate::disk::init();
    let (mut address_space, mut paging) = fresh_process(ReplacementPolicy::Scfifo, 0);

    let base = (RESERVED_INDICES * PAGE_SIZE) as u64;
    let new_sz = base + 2 * PAGE_SIZE as u64;
    assert_eq!(grow(&mut address_space, &mut paging, base, new_sz), new_sz);

    swap::uvm_unmap(&mut address_space, Some(&mut paging), base, 2, true);
    assert_eq!(paging.pages_in_memory, 0);

    // Unmapping the same range again must not panic or further decrement
    // anything.
    swap::uvm_unmap(&mut address_space, Some(&mut paging), base, 2, true);
    assert_eq!(paging.pages_in_memory, 0);
    for i in 0..2u64 {
        assert!(!paging.table[(base / PAGE_SIZE as u64) as usize + i as usize].in_use);
    }
}

#[test]
fn page_meta_starts_unallocated() {
    let meta = PageMeta::unallocated();
    assert!(!meta.in_use);
    assert_eq!(meta.offset, -1);
}
