//! Physical frame allocator (bitmap).
//!
//! Tracks all usable physical pages (4 KiB frames) with one bit per frame:
//! 0 = free, 1 = allocated. Populated from the Limine memory map once the
//! heap is up.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

const FRAME_SIZE: u64 = super::PAGE_SIZE as u64;

static FRAME_ALLOC: Mutex<Option<FrameAllocator>> = Mutex::new(None);

static TOTAL_FRAMES: AtomicU64 = AtomicU64::new(0);
static USED_FRAMES: AtomicU64 = AtomicU64::new(0);

struct FrameAllocator {
    bitmap: Vec<u64>,
    base_phys: u64,
    total_frames: usize,
    next_hint: usize,
}

impl FrameAllocator {
    fn alloc(&mut self) -> Option<u64> {
        let words = self.bitmap.len();
        for offset in 0..words {
            let idx = (self.next_hint + offset) % words;
            let word = self.bitmap[idx];
            if word == u64::MAX {
                continue;
            }
            let bit = (!word).trailing_zeros() as usize;
            let frame_index = idx * 64 + bit;
            if frame_index >= self.total_frames {
                continue;
            }
            self.bitmap[idx] |= 1u64 << bit;
            self.next_hint = idx;
            USED_FRAMES.fetch_add(1, Ordering::Relaxed);
            return Some(self.base_phys + frame_index as u64 * FRAME_SIZE);
        }
        None
    }

    fn free(&mut self, phys: u64) {
        if phys < self.base_phys {
            return;
        }
        let frame_index = ((phys - self.base_phys) / FRAME_SIZE) as usize;
        if frame_index >= self.total_frames {
            return;
        }
        let word_idx = frame_index / 64;
        let bit_idx = frame_index % 64;
        if self.bitmap[word_idx] & (1u64 << bit_idx) != 0 {
            self.bitmap[word_idx] &= !(1u64 << bit_idx);
            USED_FRAMES.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// A usable physical range from the Limine memory map.
pub struct PhysRegion {
    pub base: u64,
    pub length: u64,
}

/// Builds the bitmap from `usable_regions`, marking `[heap_phys, heap_phys +
/// heap_size)` as already used. QEMU's `virt` machine reports usable RAM
/// starting at 0x8000_0000 with nothing below it in the map, so unlike an
/// x86 memory map there is no legacy low-memory hole to carve out here.
pub fn init(usable_regions: &[PhysRegion], heap_phys: u64, heap_size: u64) {
    if usable_regions.is_empty() {
        crate::log_warn!("frame allocator: no usable regions reported");
        return;
    }

    let min_phys = usable_regions.iter().map(|r| r.base).min().unwrap();
    let max_phys = usable_regions.iter().map(|r| r.base + r.length).max().unwrap();

    let base_phys = min_phys & !(FRAME_SIZE - 1);
    let top_phys = (max_phys + FRAME_SIZE - 1) & !(FRAME_SIZE - 1);
    let total_frames = ((top_phys - base_phys) / FRAME_SIZE) as usize;

    let bitmap_words = total_frames.div_ceil(64);
    let mut bitmap = vec![u64::MAX; bitmap_words];

    for region in usable_regions {
        let region_start = (region.base.max(base_phys) - base_phys) / FRAME_SIZE;
        let region_end = ((region.base + region.length).min(top_phys) - base_phys) / FRAME_SIZE;
        for frame in region_start..region_end {
            let word = frame as usize / 64;
            let bit = frame as usize % 64;
            bitmap[word] &= !(1u64 << bit);
        }
    }

    let heap_end = heap_phys + heap_size;
    if heap_phys >= base_phys && heap_phys < top_phys {
        let start_frame = ((heap_phys - base_phys) / FRAME_SIZE) as usize;
        let end_frame = ((heap_end.min(top_phys) - base_phys) / FRAME_SIZE) as usize;
        for frame in start_frame..end_frame {
            bitmap[frame / 64] |= 1u64 << (frame % 64);
        }
    }

    let free_count = (0..total_frames)
        .filter(|&i| bitmap[i / 64] & (1u64 << (i % 64)) == 0)
        .count() as u64;
    let used_count = total_frames as u64 - free_count;

    TOTAL_FRAMES.store(total_frames as u64, Ordering::SeqCst);
    USED_FRAMES.store(used_count, Ordering::SeqCst);

    crate::log!(
        "frame allocator ready: {} total, {} free ({} MB), {} used",
        total_frames,
        free_count,
        free_count * FRAME_SIZE / 1024 / 1024,
        used_count
    );

    *FRAME_ALLOC.lock() = Some(FrameAllocator {
        bitmap,
        base_phys,
        total_frames,
        next_hint: 0,
    });
}

pub fn alloc_frame() -> Option<u64> {
    FRAME_ALLOC.lock().as_mut()?.alloc()
}

pub fn free_frame(phys: u64) {
    if let Some(alloc) = FRAME_ALLOC.lock().as_mut() {
        alloc.free(phys);
    }
}

/// Allocates a frame and zeroes it through the kernel direct map.
pub fn alloc_frame_zeroed() -> Option<u64> {
    let phys = alloc_frame()?;
    let virt = super::phys_to_virt(phys);
    unsafe {
        core::ptr::write_bytes(virt as *mut u8, 0, FRAME_SIZE as usize);
    }
    Some(phys)
}

pub fn stats() -> (u64, u64) {
    (TOTAL_FRAMES.load(Ordering::Relaxed), USED_FRAMES.load(Ordering::Relaxed))
}

/// Points the allocator at a real, page-aligned backing buffer instead of
/// the Limine memory map. Used by `memory::test_support` so tests that walk
/// `AddressSpace` page tables (which dereference `phys_to_virt` results)
/// get valid host pointers back rather than addresses that only make sense
/// on target hardware.
#[cfg(test)]
pub fn install_test_pool(base_phys: u64, total_frames: usize) {
    *FRAME_ALLOC.lock() = Some(FrameAllocator {
        bitmap: vec![0u64; total_frames.div_ceil(64)],
        base_phys,
        total_frames,
        next_hint: 0,
    });
    TOTAL_FRAMES.store(total_frames as u64, Ordering::SeqCst);
    USED_FRAMES.store(0, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_pool(total_frames: usize) {
        *FRAME_ALLOC.lock() = Some(FrameAllocator {
            bitmap: vec![0u64; total_frames.div_ceil(64)],
            base_phys: 0x1000_0000,
            total_frames,
            next_hint: 0,
        });
        TOTAL_FRAMES.store(total_frames as u64, Ordering::SeqCst);
        USED_FRAMES.store(0, Ordering::SeqCst);
    }

    #[test]
    fn alloc_is_page_aligned_and_unique() {
        init_test_pool(64);
        let mut seen = Vec::new();
        for _ in 0..16 {
            let phys = alloc_frame().expect("pool should not be exhausted");
            assert_eq!(phys % FRAME_SIZE, 0);
            assert!(!seen.contains(&phys), "frame {:#x} allocated twice", phys);
            seen.push(phys);
        }
    }

    #[test]
    fn free_allows_reallocation() {
        init_test_pool(1);
        let a = alloc_frame().unwrap();
        assert!(alloc_frame().is_none());
        free_frame(a);
        let b = alloc_frame().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stats_track_used_count() {
        init_test_pool(8);
        let (_, before) = stats();
        let f = alloc_frame().unwrap();
        let (_, after) = stats();
        assert_eq!(after, before + 1);
        free_frame(f);
    }
}
