//! Process table: PCBs, PID allocation, `fork`/`exit`, and the swap-extent
//! bookkeeping that hands each process a disjoint region of the swap disk.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::RwLock;

use crate::arch::current::context::CpuContext;
use crate::memory::paging_state::RESERVED_INDICES;
use crate::memory::swap_io::SwapFile;
use crate::memory::{self, AddressSpace, PagingState, ReplacementPolicy, MAX_TOTAL_PAGES, PAGE_SIZE};

pub type Pid = u32;

pub const PID_KERNEL: Pid = 0;
pub const PID_INIT: Pid = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Zombie,
    Dead,
}

/// One process's full state: scheduling context, address space, and (for
/// every pid beyond the two always-resident system processes) the
/// demand-paging state that governs it.
pub struct Process {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub exit_code: i32,
    pub context: CpuContext,
    /// Current address-space size in bytes — the `old_sz`/`new_sz` spec.md
    /// passes to `uvm_alloc`/`uvm_dealloc`.
    pub size: u64,
    pub children: Vec<Pid>,
    pub address_space: AddressSpace,
    pub paging: Option<PagingState>,
}

fn default_policy() -> ReplacementPolicy {
    if cfg!(feature = "policy-nfua") {
        ReplacementPolicy::Nfua
    } else if cfg!(feature = "policy-lapa") {
        ReplacementPolicy::Lapa
    } else {
        ReplacementPolicy::Scfifo
    }
}

/// Disjoint swap-disk LBA ranges are handed out by a simple bump allocator;
/// processes never release and reuse swap extents mid-run (the extent is
/// reclaimed by `disk` only conceptually — it is never fragmented further).
static NEXT_SWAP_LBA: AtomicU64 = AtomicU64::new(0);

fn alloc_swap_extent(pid: Pid) -> SwapFile {
    const SECTORS_PER_PAGE: u64 = (PAGE_SIZE / crate::disk::SECTOR_SIZE) as u64;
    let extent_sectors = MAX_TOTAL_PAGES as u64 * SECTORS_PER_PAGE;
    let base = NEXT_SWAP_LBA.fetch_add(extent_sectors, Ordering::SeqCst);
    SwapFile::new(base, MAX_TOTAL_PAGES, pid as u64)
}

impl Process {
    fn new(pid: Pid, ppid: Pid, name: &str) -> Result<Self, &'static str> {
        let address_space = AddressSpace::new().ok_or("Process::new: out of physical frames")?;
        let paging = if pid <= PID_INIT {
            None
        } else {
            Some(PagingState::new(alloc_swap_extent(pid), default_policy()))
        };
        Ok(Self {
            pid,
            ppid,
            name: String::from(name),
            state: ProcessState::Ready,
            exit_code: 0,
            context: CpuContext::new(),
            size: (RESERVED_INDICES * PAGE_SIZE) as u64,
            children: Vec::new(),
            address_space,
            paging,
        })
    }

    /// Grows this process's address space, delegating to the demand-paging
    /// growth hook. Returns the new size, or 0 (leaving `self.size`
    /// unchanged) on failure.
    pub fn grow(&mut self, new_size: u64) -> u64 {
        let result = memory::swap::uvm_alloc(
            &mut self.address_space,
            self.paging.as_mut(),
            self.size,
            new_size,
        );
        if result != 0 {
            self.size = result;
        }
        result
    }

    /// Shrinks this process's address space down to `new_size`.
    pub fn shrink(&mut self, new_size: u64) {
        self.size = memory::swap::uvm_dealloc(
            &mut self.address_space,
            self.paging.as_mut(),
            self.size,
            new_size,
        );
    }
}

struct ProcessTable {
    processes: BTreeMap<Pid, Process>,
    next_pid: AtomicU32,
}

impl ProcessTable {
    const fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_pid: AtomicU32::new(PID_INIT + 1),
        }
    }

    fn alloc_pid(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }
}

static PROCESS_TABLE: RwLock<ProcessTable> = RwLock::new(ProcessTable::new());
static CURRENT_PID: AtomicU32 = AtomicU32::new(PID_KERNEL);

pub fn init() -> Result<(), &'static str> {
    let kernel_proc = Process::new(PID_KERNEL, PID_KERNEL, "kernel")?;
    let init_proc = Process::new(PID_INIT, PID_KERNEL, "init")?;
    let mut table = PROCESS_TABLE.write();
    table.processes.insert(PID_KERNEL, kernel_proc);
    table.processes.insert(PID_INIT, init_proc);
    crate::log!("process table ready: pid 0 (kernel), pid 1 (init)");
    Ok(())
}

pub fn create(name: &str, ppid: Pid) -> Result<Pid, &'static str> {
    let mut table = PROCESS_TABLE.write();
    let pid = table.alloc_pid();
    let proc = Process::new(pid, ppid, name)?;
    if let Some(parent) = table.processes.get_mut(&ppid) {
        parent.children.push(pid);
    }
    table.processes.insert(pid, proc);
    crate::log_debug!("created process {} ({})", pid, name);
    Ok(pid)
}

/// Forks `pid`, deep-copying its address space, paging table, resident
/// queue, and swap file into a new child process (§4.7).
///
/// On failure the parent is left exactly as it was — nothing is mutated
/// until the copy has succeeded for every page.
pub fn fork(pid: Pid) -> Result<Pid, &'static str> {
    let mut table = PROCESS_TABLE.write();
    let mut parent = table.processes.remove(&pid).ok_or("fork: parent not found")?;

    let child_pid = table.alloc_pid();
    let child_result = (|| -> Result<Process, &'static str> {
        let mut child_as = AddressSpace::new().ok_or("fork: out of memory for child address space")?;
        let mut child_paging = if pid <= PID_INIT {
            None
        } else {
            let policy = parent.paging.as_ref().map(|p| p.policy).unwrap_or_else(default_policy);
            Some(PagingState::new(alloc_swap_extent(child_pid), policy))
        };

        memory::swap::uvm_copy(
            &mut parent.address_space,
            parent.paging.as_ref(),
            &mut child_as,
            child_paging.as_mut(),
            parent.size,
        )?;

        Ok(Process {
            pid: child_pid,
            ppid: pid,
            name: parent.name.clone(),
            state: ProcessState::Ready,
            exit_code: 0,
            context: CpuContext::new(),
            size: parent.size,
            children: Vec::new(),
            address_space: child_as,
            paging: child_paging,
        })
    })();

    let outcome = match child_result {
        Ok(child) => {
            parent.children.push(child_pid);
            table.processes.insert(pid, parent);
            table.processes.insert(child_pid, child);
            Ok(child_pid)
        }
        Err(e) => {
            table.processes.insert(pid, parent);
            Err(e)
        }
    };
    crate::log_debug!("fork({}) -> {:?}", pid, outcome);
    outcome
}

/// Tears down a process: marks it a zombie and reparents its children to
/// `init`. The `Process` (and with it its `AddressSpace`) is only actually
/// dropped once `reap` removes it from the table, releasing every frame.
pub fn exit(pid: Pid, code: i32) {
    let mut table = PROCESS_TABLE.write();
    let children: Vec<Pid> = if let Some(proc) = table.processes.get_mut(&pid) {
        proc.state = ProcessState::Zombie;
        proc.exit_code = code;
        proc.children.drain(..).collect()
    } else {
        return;
    };
    for child_pid in children {
        if let Some(child) = table.processes.get_mut(&child_pid) {
            child.ppid = PID_INIT;
        }
        if let Some(init) = table.processes.get_mut(&PID_INIT) {
            init.children.push(child_pid);
        }
    }
}

pub fn reap(pid: Pid) -> Option<i32> {
    let mut table = PROCESS_TABLE.write();
    let proc = table.processes.get(&pid)?;
    if proc.state != ProcessState::Zombie {
        return None;
    }
    let proc = table.processes.remove(&pid)?;
    Some(proc.exit_code)
}

pub fn current_pid() -> Pid {
    CURRENT_PID.load(Ordering::Relaxed)
}

pub fn set_current(pid: Pid) {
    CURRENT_PID.store(pid, Ordering::SeqCst);
}

/// Runs `f` with mutable access to the process table entry for `pid`, under
/// the table's write lock. Used by the fault handler and scheduler tick so
/// neither has to clone a `Process` (its `AddressSpace` owns heap state
/// that cannot be cheaply duplicated for a snapshot).
pub fn with_process<R>(pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    let mut table = PROCESS_TABLE.write();
    table.processes.get_mut(&pid).map(f)
}

pub fn count() -> usize {
    PROCESS_TABLE.read().processes.len()
}
