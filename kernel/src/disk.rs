//! Block-device driver backing the per-process swap extents.
//!
//! A flat RAM-backed disk: no partitioning, no filesystem. Swap extents are
//! handed out directly in sectors by `process::alloc_swap_extent`.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

pub const SECTOR_SIZE: usize = 512;

/// Total disk capacity: enough for 64 processes' worth of `MAX_TOTAL_PAGES`
/// swap extents at 4 KiB/page.
pub const DISK_SECTORS: u64 = 64 * (crate::memory::MAX_TOTAL_PAGES as u64) * 8;
const DISK_SIZE: usize = DISK_SECTORS as usize * SECTOR_SIZE;

pub const MAX_SECTORS_PER_IO: u8 = 128;

static DISK: Mutex<Option<Vec<u8>>> = Mutex::new(None);

static READ_COUNT: AtomicU64 = AtomicU64::new(0);
static WRITE_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    *DISK.lock() = Some(vec![0u8; DISK_SIZE]);
    crate::log!(
        "swap disk ready: {} sectors ({} KiB)",
        DISK_SECTORS,
        DISK_SIZE / 1024
    );
}

pub fn is_available() -> bool {
    DISK.lock().is_some()
}

pub fn get_stats() -> (u64, u64) {
    (
        READ_COUNT.load(Ordering::Relaxed),
        WRITE_COUNT.load(Ordering::Relaxed),
    )
}

pub fn read_sectors(lba: u64, count: u8, buffer: &mut [u8]) -> Result<usize, &'static str> {
    if count == 0 || count > MAX_SECTORS_PER_IO {
        return Err("read_sectors: invalid sector count");
    }
    let nbytes = count as usize * SECTOR_SIZE;
    if buffer.len() < nbytes {
        return Err("read_sectors: buffer too small");
    }
    let start = lba as usize * SECTOR_SIZE;
    let disk = DISK.lock();
    let disk = disk.as_ref().ok_or("read_sectors: disk not initialized")?;
    let end = start + nbytes;
    if end > disk.len() {
        return Err("read_sectors: out of range");
    }
    buffer[..nbytes].copy_from_slice(&disk[start..end]);
    READ_COUNT.fetch_add(1, Ordering::Relaxed);
    Ok(nbytes)
}

pub fn write_sectors(lba: u64, count: u8, buffer: &[u8]) -> Result<usize, &'static str> {
    if count == 0 || count > MAX_SECTORS_PER_IO {
        return Err("write_sectors: invalid sector count");
    }
    let nbytes = count as usize * SECTOR_SIZE;
    if buffer.len() < nbytes {
        return Err("write_sectors: buffer too small");
    }
    let start = lba as usize * SECTOR_SIZE;
    let mut disk = DISK.lock();
    let disk = disk.as_mut().ok_or("write_sectors: disk not initialized")?;
    let end = start + nbytes;
    if end > disk.len() {
        return Err("write_sectors: out of range");
    }
    disk[start..end].copy_from_slice(&buffer[..nbytes]);
    WRITE_COUNT.fetch_add(1, Ordering::Relaxed);
    Ok(nbytes)
}
