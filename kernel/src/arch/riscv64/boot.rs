//! Early boot-time setup specific to the RISC-V64 target.

use super::cpu::sie_bits;

pub const BOOTLOADER: &str = "Limine";

/// Enables the three supervisor interrupt sources this kernel drives
/// (external, timer, software) in `sie`. Must run before the trap vector
/// is installed and before `sstatus.SIE` is set.
pub fn early_init() {
    unsafe {
        super::cpu::write_sie(sie_bits::SEIE | sie_bits::STIE | sie_bits::SSIE);
    }
}
