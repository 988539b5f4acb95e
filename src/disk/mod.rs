//! RAM-backed virtual disk persisted to a reserved flash region.
//!
//! The whole disk lives in RAM while the device runs. Block reads and
//! writes from the USB mass-storage interface only touch RAM; the image is
//! written back to flash by an explicit [`VirtualDisk::flush`] when the host
//! ejects the drive.
//!
//! On-flash layout:
//!
//! ```text
//! Byte 0      format version
//! Byte 1-3    zero
//! Byte 4-7    image size in bytes (u32 LE), header included
//! Byte 8..    sectors 0..DISK_SECTOR_COUNT
//! ```
//!
//! A header that does not match the compiled constants means there is no
//! usable image: the disk is formatted and seeded with a readme and an empty
//! configuration document.

pub mod fat;
pub mod store;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use embedded_storage::nor_flash::NorFlash;

use crate::config::{
    CONFIG_FILE_NAME, DISK_FLASH_BLOCKS, DISK_FORMAT_VERSION, DISK_SECTOR_COUNT,
    DISK_SECTOR_SIZE, FLASH_ERASE_SIZE, FLASH_PAGE_SIZE, README_FILE_NAME,
};
use crate::error::Error;

pub use store::{ConfigStore, DiskLock};

/// Size of the on-flash header.
pub const IMAGE_HEADER_SIZE: usize = 8;

/// Bytes of sector data.
pub const DISK_SIZE: usize = DISK_SECTOR_COUNT * DISK_SECTOR_SIZE;

/// Header plus sector data, as stored in flash.
pub const IMAGE_SIZE: usize = IMAGE_HEADER_SIZE + DISK_SIZE;

/// Bytes of flash reserved for the image.
pub const REGION_SIZE: usize = DISK_FLASH_BLOCKS * FLASH_ERASE_SIZE;

const _: () = assert!(IMAGE_SIZE <= REGION_SIZE);

/// Seeded usage notes.
pub const README_TEXT: &[u8] = b"Macro keypad configuration drive.\n\
\n\
Edit config.json to define your keymaps, then eject the drive to save.\n\
The keypad reloads the file as soon as it leaves configuration mode.\n";

/// Seeded configuration document: no user keymaps.
pub const EMPTY_CONFIG: &[u8] = b"[\n]\n";

pub type Sector = [u8; DISK_SECTOR_SIZE];

/// How the disk came up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mount {
    /// A valid image was read back from flash.
    Restored,
    /// No valid image; a fresh volume was created in RAM.
    Formatted,
}

/// The disk image in RAM plus the flash it is persisted to.
pub struct VirtualDisk<F> {
    flash: F,
    offset: u32,
    sectors: Box<[Sector]>,
    dirty: bool,
}

impl<F: NorFlash> VirtualDisk<F> {
    /// Bind the disk to the region at `offset`. Nothing is read yet; call
    /// [`mount`](Self::mount) before serving I/O.
    pub fn new(flash: F, offset: u32) -> Result<Self, Error> {
        let end = offset as usize + REGION_SIZE;
        if end > flash.capacity()
            || offset as usize % F::ERASE_SIZE != 0
            || FLASH_PAGE_SIZE % F::WRITE_SIZE != 0
        {
            return Err(Error::RegionTooSmall);
        }
        Ok(Self {
            flash,
            offset,
            sectors: vec![[0u8; DISK_SECTOR_SIZE]; DISK_SECTOR_COUNT].into_boxed_slice(),
            dirty: false,
        })
    }

    /// Load the image from flash, or format a new one when the header does
    /// not match.
    pub fn mount(&mut self) -> Result<Mount, Error> {
        let mut header = [0u8; IMAGE_HEADER_SIZE];
        self.flash
            .read(self.offset, &mut header)
            .map_err(|_| Error::Storage)?;

        if header == Self::header() {
            self.flash
                .read(
                    self.offset + IMAGE_HEADER_SIZE as u32,
                    self.sectors.as_flattened_mut(),
                )
                .map_err(|_| Error::Storage)?;
            self.dirty = false;
            info!("disk: image restored from flash");
            return Ok(Mount::Restored);
        }

        warn!(
            "disk: no valid image (version {}, size {}), formatting",
            header[0],
            u32::from_le_bytes([header[4], header[5], header[6], header[7]])
        );
        self.format()?;
        Ok(Mount::Formatted)
    }

    /// Replace the RAM image with a freshly seeded volume. Flash is not
    /// touched until the next flush.
    pub fn format(&mut self) -> Result<(), Error> {
        let image = self.sectors.as_flattened_mut();
        fat::format(image);
        fat::create_file(image, README_FILE_NAME, README_TEXT)?;
        fat::create_file(image, CONFIG_FILE_NAME, EMPTY_CONFIG)?;
        self.dirty = true;
        Ok(())
    }

    fn header() -> [u8; IMAGE_HEADER_SIZE] {
        let mut header = [0u8; IMAGE_HEADER_SIZE];
        header[0] = DISK_FORMAT_VERSION;
        header[4..].copy_from_slice(&(IMAGE_SIZE as u32).to_le_bytes());
        header
    }

    fn check(lba: u32, offset: u32, len: usize) -> Result<usize, Error> {
        let lba = lba as usize;
        if lba >= DISK_SECTOR_COUNT {
            return Err(Error::LbaOutOfRange);
        }
        if offset != 0 || len != DISK_SECTOR_SIZE {
            return Err(Error::PartialSector);
        }
        Ok(lba)
    }

    /// Copy one whole sector out.
    pub fn read(&self, lba: u32, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        let lba = Self::check(lba, offset, buf.len())?;
        buf.copy_from_slice(&self.sectors[lba]);
        Ok(())
    }

    /// Overwrite one whole sector in RAM.
    pub fn write(&mut self, lba: u32, offset: u32, data: &[u8]) -> Result<(), Error> {
        let lba = Self::check(lba, offset, data.len())?;
        let sector = &mut self.sectors[lba];
        if sector[..] != *data {
            sector.copy_from_slice(data);
            self.dirty = true;
        }
        Ok(())
    }

    /// `true` when RAM holds writes that flash does not.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the image: erase the whole region, then program it page by
    /// page. The last page is zero padded.
    ///
    /// `&mut self` keeps every other reader and writer out for the whole
    /// erase and program sequence.
    pub fn flush(&mut self) -> Result<(), Error> {
        info!("disk: flushing {} bytes to flash", IMAGE_SIZE);

        self.flash
            .erase(self.offset, self.offset + REGION_SIZE as u32)
            .map_err(|_| Error::Storage)?;

        let header = Self::header();
        let mut bytes = header
            .iter()
            .chain(self.sectors.as_flattened().iter())
            .copied();

        let mut address = self.offset;
        loop {
            let mut page = [0u8; FLASH_PAGE_SIZE];
            let mut len = 0;
            for (slot, byte) in page.iter_mut().zip(bytes.by_ref()) {
                *slot = byte;
                len += 1;
            }
            if len == 0 {
                break;
            }
            self.flash
                .write(address, &page)
                .map_err(|_| Error::Storage)?;
            address += FLASH_PAGE_SIZE as u32;
        }

        self.dirty = false;
        info!("disk: flush complete");
        Ok(())
    }

    /// Contents of a root-directory file, as the host last left it.
    pub fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        fat::read_file(self.sectors.as_flattened(), name)
    }

    /// Size a root-directory file claims in its directory entry.
    pub fn file_size(&self, name: &str) -> Option<usize> {
        fat::find_file(self.sectors.as_flattened(), name).map(|entry| entry.size)
    }

    /// Give the flash back, dropping the RAM image.
    pub fn release(self) -> F {
        self.flash
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::testutil::RamFlash;

    const OFFSET: u32 = 2 * FLASH_ERASE_SIZE as u32;

    fn flash() -> RamFlash {
        RamFlash::new(OFFSET as usize + REGION_SIZE)
    }

    fn mounted(flash: RamFlash) -> (VirtualDisk<RamFlash>, Mount) {
        let mut disk = VirtualDisk::new(flash, OFFSET).unwrap();
        let mount = disk.mount().unwrap();
        (disk, mount)
    }

    fn sector(fill: u8) -> Sector {
        [fill; DISK_SECTOR_SIZE]
    }

    #[test]
    fn blank_flash_is_formatted_and_seeded() {
        let (disk, mount) = mounted(flash());
        assert_eq!(mount, Mount::Formatted);
        assert!(disk.is_dirty());
        assert_eq!(disk.read_file(CONFIG_FILE_NAME).as_deref(), Some(EMPTY_CONFIG));
        assert_eq!(disk.read_file(README_FILE_NAME).as_deref(), Some(README_TEXT));

        let mut boot = sector(0);
        disk.read(0, 0, &mut boot).unwrap();
        assert_eq!(&boot[510..], &[0x55, 0xAA]);
        let mut fsinfo = sector(0);
        disk.read(1, 0, &mut fsinfo).unwrap();
        assert_eq!(&fsinfo[488..496], &[91, 0, 0, 0, 5, 0, 0, 0]);
    }

    #[test]
    fn region_must_fit() {
        let small = RamFlash::new(REGION_SIZE - FLASH_ERASE_SIZE);
        assert_eq!(VirtualDisk::new(small, 0).err(), Some(Error::RegionTooSmall));
        assert_eq!(VirtualDisk::new(flash(), 100).err(), Some(Error::RegionTooSmall));
    }

    #[test]
    fn out_of_range_and_partial_transfers_are_rejected() {
        let (mut disk, _) = mounted(flash());
        let mut buf = sector(0);
        assert_eq!(disk.read(128, 0, &mut buf), Err(Error::LbaOutOfRange));
        assert_eq!(disk.write(128, 0, &buf), Err(Error::LbaOutOfRange));
        assert_eq!(disk.read(5, 1, &mut buf), Err(Error::PartialSector));
        assert_eq!(disk.write(5, 0, &buf[..100]), Err(Error::PartialSector));
        assert_eq!(disk.read(5, 0, &mut [0u8; 1024]), Err(Error::PartialSector));
    }

    #[test]
    fn write_is_visible_before_flush() {
        let (mut disk, _) = mounted(flash());
        disk.write(5, 0, &sector(0x5A)).unwrap();
        let mut buf = sector(0);
        disk.read(5, 0, &mut buf).unwrap();
        assert_eq!(buf, sector(0x5A));
    }

    #[test]
    fn restart_without_flush_reverts() {
        let (mut disk, _) = mounted(flash());
        disk.flush().unwrap();
        let mut before = sector(0);
        disk.read(5, 0, &mut before).unwrap();

        disk.write(5, 0, &sector(0x77)).unwrap();
        let (disk, mount) = mounted(disk.release());
        assert_eq!(mount, Mount::Restored);

        let mut after = sector(0);
        disk.read(5, 0, &mut after).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn flush_round_trips_every_sector() {
        let (mut disk, _) = mounted(flash());
        for lba in [3u32, 40, 127] {
            disk.write(lba, 0, &sector(lba as u8)).unwrap();
        }
        disk.flush().unwrap();
        assert!(!disk.is_dirty());

        let snapshot: Vec<Sector> = (0..DISK_SECTOR_COUNT as u32)
            .map(|lba| {
                let mut s = sector(0);
                disk.read(lba, 0, &mut s).unwrap();
                s
            })
            .collect();

        let (reloaded, mount) = mounted(disk.release());
        assert_eq!(mount, Mount::Restored);
        assert!(!reloaded.is_dirty());
        for (lba, expected) in snapshot.iter().enumerate() {
            let mut s = sector(0);
            reloaded.read(lba as u32, 0, &mut s).unwrap();
            assert_eq!(&s, expected, "sector {lba}");
        }
    }

    #[test]
    fn flush_pads_the_last_page_with_zeros() {
        let (mut disk, _) = mounted(flash());
        disk.write(127, 0, &sector(0xFF)).unwrap();
        disk.flush().unwrap();

        let flash = disk.release();
        let end = OFFSET as usize + IMAGE_SIZE;
        let page_end = (OFFSET as usize + IMAGE_SIZE).div_ceil(FLASH_PAGE_SIZE) * FLASH_PAGE_SIZE;
        assert!(flash.bytes()[end - 8..end].iter().all(|&b| b == 0xFF));
        assert!(flash.bytes()[end..page_end].iter().all(|&b| b == 0x00));
        assert_eq!(flash.erase_count(), 1);
        assert!(flash.writes().iter().all(|&(_, len)| len == FLASH_PAGE_SIZE));
    }

    #[test]
    fn identical_write_does_not_dirty() {
        let (mut disk, _) = mounted(flash());
        disk.flush().unwrap();
        let mut current = sector(0);
        disk.read(9, 0, &mut current).unwrap();
        disk.write(9, 0, &current).unwrap();
        assert!(!disk.is_dirty());
        disk.write(9, 0, &sector(1)).unwrap();
        assert!(disk.is_dirty());
    }

    #[test]
    fn version_mismatch_reformats() {
        let (mut disk, _) = mounted(flash());
        disk.write(50, 0, &sector(0x42)).unwrap();
        disk.flush().unwrap();

        let mut flash = disk.release();
        flash.bytes_mut()[OFFSET as usize] = DISK_FORMAT_VERSION + 1;
        let (disk, mount) = mounted(flash);
        assert_eq!(mount, Mount::Formatted);
        let mut s = sector(0);
        disk.read(50, 0, &mut s).unwrap();
        assert_eq!(s, sector(0));
    }

    #[test]
    fn storage_failure_is_reported() {
        let (disk, _) = mounted(flash());
        let mut flash = disk.release();
        flash.fail_writes(true);
        let mut disk = VirtualDisk::new(flash, OFFSET).unwrap();
        disk.mount().unwrap();
        assert_eq!(disk.flush(), Err(Error::Storage));
        assert!(disk.is_dirty());
    }
}
