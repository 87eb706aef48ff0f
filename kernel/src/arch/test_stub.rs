//! Host stand-in for the riscv64 backend, compiled in whenever
//! `target_arch` isn't riscv64 — in practice, only when `cargo test` runs
//! against the host triple. Mirrors the riscv64 module shape exactly so
//! `memory`, `process` and `serial` never need a `#[cfg]` of their own.

pub mod context {
    /// Host analogue of `riscv64::context::CpuContext`: same field shape and
    /// API, but `satp`/`sstatus` are inert values rather than real CSR
    /// contents since nothing here ever runs a `sret`.
    #[derive(Clone)]
    pub struct CpuContext {
        pub x: [u64; 32],
        pub pc: u64,
        pub sstatus: u64,
        pub satp: u64,
        pub tp: u64,
        pub fp_state: [u8; 256],
    }

    impl CpuContext {
        pub fn new() -> Self {
            Self {
                x: [0; 32],
                pc: 0,
                sstatus: 0,
                satp: 0,
                tp: 0,
                fp_state: [0; 256],
            }
        }

        pub fn set_entry(&mut self, entry: u64) {
            self.pc = entry;
        }

        pub fn set_stack(&mut self, sp: u64) {
            self.x[2] = sp;
        }

        pub fn set_page_table(&mut self, satp: u64) {
            self.satp = satp;
        }

        pub fn instruction_pointer(&self) -> u64 {
            self.pc
        }

        pub fn stack_pointer(&self) -> u64 {
            self.x[2]
        }
    }

    impl Default for CpuContext {
        fn default() -> Self {
            Self::new()
        }
    }
}

pub mod memory {
    /// No real TLB to shoot down on the host; tests only ever check
    /// `PageMeta`/PTE bookkeeping, not actual address translation.
    pub fn flush_tlb(_addr: u64) {}
    pub fn flush_tlb_all() {}

    /// Same bit layout as the real Sv39 `satp` so `AddressSpace::cr3_satp`
    /// assertions in tests see realistic values.
    pub fn make_satp_sv39(root_ppn: u64, asid: u16) -> u64 {
        const SV39_MODE: u64 = 8 << 60;
        SV39_MODE | ((asid as u64) << 44) | (root_ppn & 0xFFF_FFFF_FFFF)
    }
}

pub mod serial {
    pub fn init() {}

    pub fn write_bytes(bytes: &[u8]) {
        #[cfg(test)]
        {
            use std::io::Write;
            let _ = std::io::stdout().write_all(bytes);
        }
        #[cfg(not(test))]
        {
            let _ = bytes;
        }
    }

    pub fn read_byte() -> Option<u8> {
        None
    }
}

pub mod interrupts {
    /// Single-threaded host process: nothing to disable, so just run `f`.
    pub fn without_interrupts<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        f()
    }
}
