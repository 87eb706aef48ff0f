#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(target_arch = "riscv64")]
pub use riscv64 as current;

// Host test builds (`cargo test` normally targets the host triple, not
// riscv64gc-unknown-none-elf) still need every module under `memory` and
// `process` to compile, since unit tests live alongside the code they
// exercise rather than in a separate crate. `test_stub` gives them
// something to link against in place of real CSR/MMIO access.
#[cfg(not(target_arch = "riscv64"))]
pub mod test_stub;

#[cfg(not(target_arch = "riscv64"))]
pub use test_stub as current;
