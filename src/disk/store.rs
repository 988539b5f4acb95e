//! Shared access to the virtual disk.
//!
//! The mass-storage class and the control loop both reach the disk through
//! one blocking mutex. Every sector transfer and the whole flush run inside
//! a single lock section, so a reader never sees a half-flushed image.

use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_storage::nor_flash::NorFlash;

use super::VirtualDisk;
use crate::config::{CONFIG_FILE_NAME, MAX_CONFIG_FILE_SIZE};
use crate::error::Error;

/// The disk behind the lock shared by USB and the control loop.
pub type DiskLock<R, F> = Mutex<R, RefCell<VirtualDisk<F>>>;

/// Where the control loop reads its configuration from and persists it to.
pub trait ConfigStore {
    /// Raw bytes of `config.json`, `None` when the file is missing or
    /// larger than [`MAX_CONFIG_FILE_SIZE`].
    fn read_config(&mut self) -> Option<Vec<u8>>;

    /// Write pending changes to non-volatile storage. Does nothing when
    /// storage is already current.
    fn flush(&mut self) -> Result<(), Error>;
}

fn read_config_file<F: NorFlash>(disk: &VirtualDisk<F>) -> Option<Vec<u8>> {
    let size = disk.file_size(CONFIG_FILE_NAME)?;
    if size > MAX_CONFIG_FILE_SIZE {
        warn!("disk: config file is {} bytes, limit {}", size, MAX_CONFIG_FILE_SIZE);
        return None;
    }
    disk.read_file(CONFIG_FILE_NAME)
}

fn flush_if_dirty<F: NorFlash>(disk: &mut VirtualDisk<F>) -> Result<(), Error> {
    if disk.is_dirty() {
        disk.flush()
    } else {
        debug!("disk: nothing to flush");
        Ok(())
    }
}

impl<F: NorFlash> ConfigStore for VirtualDisk<F> {
    fn read_config(&mut self) -> Option<Vec<u8>> {
        read_config_file(self)
    }

    fn flush(&mut self) -> Result<(), Error> {
        flush_if_dirty(self)
    }
}

impl<R: RawMutex, F: NorFlash> ConfigStore for &DiskLock<R, F> {
    fn read_config(&mut self) -> Option<Vec<u8>> {
        self.lock(|disk| read_config_file(&disk.borrow()))
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.lock(|disk| flush_if_dirty(&mut disk.borrow_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DISK_SECTOR_SIZE, FLASH_ERASE_SIZE};
    use crate::disk::{fat, EMPTY_CONFIG, REGION_SIZE};
    use crate::testutil::RamFlash;
    use alloc::vec;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn mounted() -> VirtualDisk<RamFlash> {
        let mut disk = VirtualDisk::new(RamFlash::new(REGION_SIZE + FLASH_ERASE_SIZE), 0).unwrap();
        disk.mount().unwrap();
        disk
    }

    #[test]
    fn locked_disk_reads_config_and_flushes_once() {
        let lock: DiskLock<NoopRawMutex, RamFlash> = Mutex::new(RefCell::new(mounted()));

        let mut store = &lock;
        assert_eq!(store.read_config().as_deref(), Some(EMPTY_CONFIG));
        store.flush().unwrap();
        store.flush().unwrap();

        let disk = lock.into_inner().into_inner();
        assert_eq!(disk.release().erase_count(), 1);
    }

    fn with_config(data: &[u8]) -> VirtualDisk<RamFlash> {
        let mut image = vec![0u8; crate::disk::DISK_SIZE];
        fat::format(&mut image);
        fat::create_file(&mut image, CONFIG_FILE_NAME, data).unwrap();

        let mut disk = mounted();
        for (lba, sector) in image.chunks_exact(DISK_SECTOR_SIZE).enumerate() {
            disk.write(lba as u32, 0, sector).unwrap();
        }
        disk
    }

    #[test]
    fn config_at_the_size_limit_is_read() {
        let data = vec![b' '; MAX_CONFIG_FILE_SIZE];
        let mut disk = with_config(&data);
        assert_eq!(disk.read_config().map(|c| c.len()), Some(MAX_CONFIG_FILE_SIZE));
    }

    #[test]
    fn oversized_config_is_not_read() {
        let data = vec![b' '; MAX_CONFIG_FILE_SIZE + 1];
        let mut disk = with_config(&data);
        assert_eq!(disk.file_size(CONFIG_FILE_NAME), Some(MAX_CONFIG_FILE_SIZE + 1));
        assert_eq!(disk.read_config(), None);

        let lock: DiskLock<NoopRawMutex, RamFlash> = Mutex::new(RefCell::new(disk));
        let mut store = &lock;
        assert_eq!(store.read_config(), None);
    }
}
