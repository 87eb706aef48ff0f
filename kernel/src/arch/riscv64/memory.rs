//! Sv39 address-translation control: `satp` manipulation and TLB flushes.

use super::cpu;

pub fn flush_tlb(addr: u64) {
    cpu::sfence_vma(addr);
}

pub fn flush_tlb_all() {
    cpu::sfence_vma_all();
}

pub fn read_page_table_root() -> u64 {
    cpu::read_satp()
}

pub unsafe fn write_page_table_root(val: u64) {
    cpu::write_satp(val);
}

pub fn make_satp_sv39(root_ppn: u64, asid: u16) -> u64 {
    cpu::satp_mode::SV39 | ((asid as u64) << 44) | (root_ppn & 0xFFF_FFFF_FFFF)
}

pub fn satp_ppn(satp: u64) -> u64 {
    satp & 0xFFF_FFFF_FFFF
}
