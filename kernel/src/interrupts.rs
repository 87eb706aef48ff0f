//! Trap/interrupt dispatch.
//!
//! Installs the supervisor trap vector and routes `scause` onto the two
//! traps this kernel actually cares about: a load/store page fault goes to
//! the demand-paging fault hook, a supervisor timer interrupt goes to the
//! scheduler tick. Anything else is a bug, not a recoverable condition, so
//! it gets logged and the kernel panics.

use crate::arch::riscv64::cpu::{self, scause, sie_bits};
use crate::arch::riscv64::{timer, trap};
use crate::process;

/// Timer period in `time`-CSR ticks. QEMU virt's fixed 10 MHz `time`
/// frequency (see `timer::frequency`) makes this ~10 ms per tick.
const TIMER_PERIOD_CYCLES: u64 = 100_000;

pub fn init() {
    trap::install();
    unsafe {
        cpu::write_sie(cpu::read_sie() | sie_bits::STIE);
    }
    timer::set_oneshot(TIMER_PERIOD_CYCLES);
    crate::log!("trap vector installed, supervisor timer armed");
}

/// Called from `_trap_entry` with a pointer to the saved register frame.
/// The frame isn't touched here — page faults resume at the same `sepc`
/// once the page is resident, and the timer interrupt doesn't need to
/// inspect or rewrite any register.
#[no_mangle]
extern "C" fn trap_dispatch(frame: *mut trap::TrapFrame) {
    let _ = frame;
    let cause = cpu::read_scause();
    match cause {
        scause::SUPERVISOR_TIMER => handle_timer(),
        scause::LOAD_PAGE_FAULT | scause::STORE_PAGE_FAULT => handle_page_fault(),
        other => {
            crate::log_error!(
                "unhandled trap scause={:#x} stval={:#x} sepc={:#x}",
                other,
                cpu::read_stval(),
                cpu::read_sepc()
            );
            panic!("unhandled trap scause={:#x}", other);
        }
    }
}

fn handle_timer() {
    crate::logger::tick();
    timer::set_oneshot(TIMER_PERIOD_CYCLES);
    crate::scheduler::on_timer_tick();
}

/// Routes a hardware page fault to the same `handle_page_fault` the
/// demand-paging subsystem exposes for direct, non-trapping invocation
/// (the fault path this kernel's tests actually drive, since nothing here
/// runs a real user-mode program that could take a live MMU fault).
fn handle_page_fault() {
    let fault_va = cpu::read_stval();
    let pid = process::current_pid();
    let handled = process::with_process(pid, |proc| match proc.paging.as_mut() {
        Some(paging) => {
            crate::memory::swap::handle_page_fault(paging, &mut proc.address_space, fault_va);
            true
        }
        None => false,
    });
    if handled != Some(true) {
        crate::log_error!("page fault in pid {} at {:#x} with no paging state", pid, fault_va);
        panic!("unrecoverable page fault");
    }
}
