//! Kernel heap allocator — a `linked_list_allocator` free-list heap serving
//! as the crate's `#[global_allocator]`.

use linked_list_allocator::LockedHeap;

#[cfg_attr(not(test), global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initializes the heap over `[heap_start, heap_start + heap_size)`. Must be
/// called exactly once, after the frame/region this range lives in has been
/// reserved against the physical memory map.
pub fn init_at(heap_start: usize, heap_size: usize) {
    unsafe {
        ALLOCATOR.lock().init(heap_start as *mut u8, heap_size);
    }
}

pub fn used() -> usize {
    ALLOCATOR.lock().used()
}

pub fn free() -> usize {
    ALLOCATOR.lock().free()
}
