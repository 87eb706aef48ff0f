//! Pager kernel entry point and boot sequence.
//!
//! Boots via Limine on QEMU's RISC-V `virt` machine. Under `#[cfg(test)]`
//! the crate drops `no_std`/`no_main` entirely (see `memory::heap`'s
//! `#[cfg_attr(not(test), global_allocator)]`) so the demand-paging unit
//! tests scattered through `memory` and `process` run against the host's
//! own `std` test harness instead of needing a bare-metal test runner.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), feature(alloc_error_handler))]

extern crate alloc;

#[macro_use]
pub mod logger;
#[macro_use]
pub mod serial;
pub mod arch;
pub mod disk;
pub mod memory;
pub mod process;

#[cfg(target_arch = "riscv64")]
pub mod interrupts;
#[cfg(target_arch = "riscv64")]
pub mod scheduler;

#[cfg(all(target_arch = "riscv64", not(test)))]
mod boot {
    use alloc::vec::Vec;
    use limine::memory_map::EntryType;
    use limine::request::{HhdmRequest, MemoryMapRequest};
    use limine::BaseRevision;

    #[used]
    #[unsafe(link_section = ".requests")]
    static BASE_REVISION: BaseRevision = BaseRevision::new();

    #[used]
    #[unsafe(link_section = ".requests")]
    static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

    #[used]
    #[unsafe(link_section = ".requests")]
    static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

    fn align_up(addr: u64, align: u64) -> u64 {
        (addr + align - 1) & !(align - 1)
    }

    fn halt_loop() -> ! {
        loop {
            crate::arch::riscv64::halt();
        }
    }

    /// Entry point called by Limine after it hands off to the kernel image.
    ///
    /// Phases, in order: serial console, physical memory map ingestion,
    /// heap, frame allocator, swap disk, process table, trap vector +
    /// scheduler, then interrupts on and idle.
    #[no_mangle]
    pub unsafe extern "C" fn kmain() -> ! {
        if !BASE_REVISION.is_supported() {
            halt_loop();
        }

        crate::serial::init();
        crate::serial_println!("pager kernel booting");

        let Some(mmap) = MEMORY_MAP_REQUEST.get_response() else {
            crate::serial_println!("no memory map from bootloader, cannot continue");
            halt_loop();
        };
        let hhdm_offset = HHDM_REQUEST.get_response().map(|r| r.offset()).unwrap_or(0);
        crate::memory::set_direct_map_offset(hhdm_offset);
        crate::serial_println!("HHDM offset: {:#x}", hhdm_offset);

        let mut usable_regions = Vec::new();
        let mut kernel_end: u64 = 0;
        let mut total_phys: u64 = 0;
        for entry in mmap.entries() {
            match entry.entry_type {
                EntryType::USABLE => {
                    usable_regions.push(crate::memory::frame::PhysRegion {
                        base: entry.base,
                        length: entry.length,
                    });
                    total_phys += entry.length;
                }
                EntryType::EXECUTABLE_AND_MODULES | EntryType::BOOTLOADER_RECLAIMABLE => {
                    let end = entry.base + entry.length;
                    if end > kernel_end {
                        kernel_end = end;
                    }
                    total_phys += entry.length;
                }
                _ => {}
            }
        }
        crate::memory::set_total_physical_memory(total_phys);
        crate::serial_println!("total physical memory: {} MiB", total_phys / 1024 / 1024);

        let heap_size = crate::memory::compute_heap_size(total_phys);
        let min_heap_base = align_up(kernel_end, crate::memory::PAGE_SIZE as u64);

        let mut heap_phys = None;
        for entry in mmap.entries() {
            if entry.entry_type != EntryType::USABLE {
                continue;
            }
            let region_end = entry.base.saturating_add(entry.length);
            if region_end <= min_heap_base {
                continue;
            }
            let start = entry.base.max(min_heap_base);
            if region_end >= start + heap_size {
                heap_phys = Some(start);
                break;
            }
        }
        // Nothing after the kernel image is big enough; fall back to the
        // largest usable region reported.
        let heap_phys = heap_phys.or_else(|| {
            mmap.entries()
                .iter()
                .filter(|e| e.entry_type == EntryType::USABLE)
                .max_by_key(|e| e.length)
                .map(|e| align_up(e.base, crate::memory::PAGE_SIZE as u64))
        });
        let Some(heap_phys) = heap_phys else {
            crate::serial_println!(
                "no region large enough for a {} MiB heap",
                heap_size / 1024 / 1024
            );
            halt_loop();
        };

        crate::serial_println!("heap: {} MiB at phys {:#x}", heap_size / 1024 / 1024, heap_phys);
        crate::memory::heap::init_at(
            crate::memory::phys_to_virt(heap_phys) as usize,
            heap_size as usize,
        );

        crate::memory::frame::init(&usable_regions, heap_phys, heap_size);
        crate::disk::init();

        if crate::process::init().is_err() {
            crate::serial_println!("process table init failed, cannot continue");
            halt_loop();
        }

        crate::interrupts::init();
        crate::scheduler::init();
        crate::scheduler::spawn(crate::process::PID_INIT);

        crate::serial_println!("boot complete, entering idle loop");
        crate::arch::riscv64::interrupts::enable();
        loop {
            crate::arch::riscv64::halt();
        }
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    serial_println!("\n!!! KERNEL PANIC !!!");
    serial_println!("{}", info);
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}

#[cfg(not(test))]
#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    serial_println!("\n!!! ALLOC ERROR !!! size={} align={}", layout.size(), layout.align());
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}
