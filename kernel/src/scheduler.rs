//! Round-robin process scheduler.
//!
//! One ready queue, no priority levels — this kernel only ever runs a
//! handful of lab processes, so a single `VecDeque<Pid>` is enough. The one
//! invariant that matters is ordering on a timer tick: the outgoing
//! process's replacement-policy aging step must run *before* the page table
//! is switched away from it, so `age_tick` always sees the access bits that
//! process's own execution just set.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;

use crate::memory::swap;
use crate::process::{self, Pid, PID_KERNEL};

static READY_QUEUE: Mutex<VecDeque<Pid>> = Mutex::new(VecDeque::new());
static CURRENT: Mutex<Pid> = Mutex::new(PID_KERNEL);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static TIME_SLICE: AtomicU64 = AtomicU64::new(0);
const DEFAULT_QUANTUM: u64 = 10;

pub fn init() {
    *CURRENT.lock() = PID_KERNEL;
    INITIALIZED.store(true, Ordering::SeqCst);
    crate::log!("scheduler ready (round-robin, quantum {} ticks)", DEFAULT_QUANTUM);
}

/// Adds `pid` to the back of the ready queue. Called once a process has been
/// created and is eligible to run.
pub fn spawn(pid: Pid) {
    READY_QUEUE.lock().push_back(pid);
    crate::log_debug!("scheduler: queued pid {}", pid);
}

/// Called from the timer trap on every supervisor timer interrupt.
pub fn on_timer_tick() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    let slice = TIME_SLICE.fetch_add(1, Ordering::Relaxed);
    if slice + 1 >= DEFAULT_QUANTUM {
        TIME_SLICE.store(0, Ordering::Relaxed);
        schedule();
    }
}

/// Ages the outgoing process's resident pages, then switches to the next
/// ready process, round-robin. A process with no paging state (the two
/// always-resident system processes) is skipped for aging but still
/// scheduled normally.
pub fn schedule() {
    let outgoing = *CURRENT.lock();
    process::with_process(outgoing, |proc| {
        if let Some(paging) = proc.paging.as_mut() {
            swap::age_tick(paging, &mut proc.address_space);
        }
    });

    let mut queue = READY_QUEUE.lock();
    let Some(next) = queue.pop_front() else {
        return;
    };
    if outgoing != PID_KERNEL {
        queue.push_back(outgoing);
    }
    drop(queue);

    *CURRENT.lock() = next;
    process::set_current(next);

    if let Some(satp) = process::with_process(next, |proc| proc.address_space.cr3_satp(0)) {
        unsafe {
            crate::arch::riscv64::cpu::write_satp(satp);
        }
    }
}

pub fn current_pid() -> Pid {
    *CURRENT.lock()
}

pub fn yield_now() {
    schedule();
}

pub fn stats() -> SchedulerStats {
    SchedulerStats {
        ready_count: READY_QUEUE.lock().len(),
        current_pid: *CURRENT.lock(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerStats {
    pub ready_count: usize,
    pub current_pid: Pid,
}
