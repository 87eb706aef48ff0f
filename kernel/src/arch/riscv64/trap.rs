//! Supervisor trap entry: a flat, single-mode (no user/kernel split) vector
//! that saves every general-purpose register onto the interrupted hart's own
//! stack, hands a pointer to the saved frame to `interrupts::trap_dispatch`,
//! then restores and `sret`s.
//!
//! This kernel never switches to U-mode (no ELF loader, no `exec` — see
//! SPEC_FULL.md's non-goals), so there is no trampoline page and no second
//! page table to juggle on entry the way a real xv6/xous trap path does:
//! the interrupted context's own stack is always a valid supervisor stack.

use super::context::CpuContext;

core::arch::global_asm!(
    ".section .text.trap",
    ".align 4",
    ".global _trap_entry",
    "_trap_entry:",
    "addi sp, sp, -272",
    "sd x1,   8(sp)",
    "sd x3,  24(sp)",
    "sd x4,  32(sp)",
    "sd x5,  40(sp)",
    "sd x6,  48(sp)",
    "sd x7,  56(sp)",
    "sd x8,  64(sp)",
    "sd x9,  72(sp)",
    "sd x10, 80(sp)",
    "sd x11, 88(sp)",
    "sd x12, 96(sp)",
    "sd x13, 104(sp)",
    "sd x14, 112(sp)",
    "sd x15, 120(sp)",
    "sd x16, 128(sp)",
    "sd x17, 136(sp)",
    "sd x18, 144(sp)",
    "sd x19, 152(sp)",
    "sd x20, 160(sp)",
    "sd x21, 168(sp)",
    "sd x22, 176(sp)",
    "sd x23, 184(sp)",
    "sd x24, 192(sp)",
    "sd x25, 200(sp)",
    "sd x26, 208(sp)",
    "sd x27, 216(sp)",
    "sd x28, 224(sp)",
    "sd x29, 232(sp)",
    "sd x30, 240(sp)",
    "sd x31, 248(sp)",
    "addi t0, sp, 272",
    "sd t0,  16(sp)",       // frame.x[2] (sp) = pre-trap stack pointer
    "csrr t0, sepc",
    "sd t0, 256(sp)",
    "csrr t0, sstatus",
    "sd t0, 264(sp)",
    "mv a0, sp",
    "call trap_dispatch",
    "ld t0, 256(sp)",
    "csrw sepc, t0",
    "ld t0, 264(sp)",
    "csrw sstatus, t0",
    "ld x1,   8(sp)",
    "ld x3,  24(sp)",
    "ld x4,  32(sp)",
    "ld x5,  40(sp)",
    "ld x6,  48(sp)",
    "ld x7,  56(sp)",
    "ld x8,  64(sp)",
    "ld x9,  72(sp)",
    "ld x10, 80(sp)",
    "ld x11, 88(sp)",
    "ld x12, 96(sp)",
    "ld x13, 104(sp)",
    "ld x14, 112(sp)",
    "ld x15, 120(sp)",
    "ld x16, 128(sp)",
    "ld x17, 136(sp)",
    "ld x18, 144(sp)",
    "ld x19, 152(sp)",
    "ld x20, 160(sp)",
    "ld x21, 168(sp)",
    "ld x22, 176(sp)",
    "ld x23, 184(sp)",
    "ld x24, 192(sp)",
    "ld x25, 200(sp)",
    "ld x26, 208(sp)",
    "ld x27, 216(sp)",
    "ld x28, 224(sp)",
    "ld x29, 232(sp)",
    "ld x30, 240(sp)",
    "ld x31, 248(sp)",
    "addi sp, sp, 272",
    "sret",
);

extern "C" {
    fn _trap_entry();
}

/// Points `stvec` at the trap vector in Direct mode (mode bits `00`, which
/// `_trap_entry`'s 4-byte alignment guarantees are already clear).
pub fn install() {
    unsafe {
        super::cpu::write_stvec(_trap_entry as usize as u64);
    }
}

/// The saved-register layout `_trap_entry` writes to the stack, reused
/// verbatim as `CpuContext` — both are `x[32]` + `pc` + `sstatus` at the
/// same offsets, so a trapframe and a scheduler-saved context are
/// interchangeable.
pub type TrapFrame = CpuContext;
