//! Architecture hook for syscall entry. On RISC-V, `ecall` from U-mode
//! traps through the same `stvec` vector as every other exception, so
//! there is nothing to install here beyond what `interrupts::init` already
//! wires up.
pub fn init_syscall(_handler_addr: u64) {}
