//! Minimal FAT support for the virtual disk.
//!
//! Two halves:
//!
//! - **Writer**: lays down an empty FAT32 volume sized to the disk (boot
//!   sector, FSInfo, backup copies, both FATs, a labelled root directory)
//!   and creates small files in the root directory. Only used on a freshly
//!   formatted image.
//! - **Reader**: finds a file in the root directory of whatever layout the
//!   host left behind (FAT12, FAT16 or FAT32; long or 8.3 names) and
//!   follows its cluster chain.
//!
//! Everything works on the flat image (`sector * DISK_SECTOR_SIZE + byte`).
//!
//! ```text
//! Sector   0       boot sector (BPB)
//! Sector   1       FSInfo
//! Sector   6/7     backup boot sector / FSInfo
//! Sector  32       FAT #1
//! Sector  33       FAT #2
//! Sector  34..     data area, cluster 2 = root directory
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::{DISK_SECTOR_COUNT, DISK_SECTOR_SIZE};
use crate::error::Error;

const SECTOR: usize = DISK_SECTOR_SIZE;
const DIR_ENTRY_SIZE: usize = 32;
const LFN_CHARS: usize = 13;

// Volume geometry written by `format`.
const RESERVED_SECTORS: usize = 32;
const FAT_COUNT: usize = 2;
const FAT_SECTORS: usize = ((DISK_SECTOR_COUNT - RESERVED_SECTORS) * 4).div_ceil(SECTOR);
const FIRST_DATA_SECTOR: usize = RESERVED_SECTORS + FAT_COUNT * FAT_SECTORS;
const CLUSTER_COUNT: usize = DISK_SECTOR_COUNT - FIRST_DATA_SECTOR;
const ROOT_CLUSTER: usize = 2;
const FSINFO_SECTOR: usize = 1;
const BACKUP_BOOT_SECTOR: usize = 6;

const VOLUME_ID: u32 = 0x2025_0101;
const VOLUME_LABEL: &[u8; 11] = b"MACROPAD   ";

/// 2025-01-01, FAT date encoding.
const FIXED_DATE: u16 = ((2025 - 1980) << 9) | (1 << 5) | 1;

const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x20;
const ATTR_LONG_NAME: u8 = 0x0F;
const ATTR_LONG_NAME_MASK: u8 = 0x3F;

/// `DIR_NTRes` bits: base / extension stored lower case.
const NT_LOWER_BASE: u8 = 0x08;
const NT_LOWER_EXT: u8 = 0x10;

const ENTRY_FREE: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;
const LFN_LAST: u8 = 0x40;

const FAT32_MASK: u32 = 0x0FFF_FFFF;
const FAT32_EOC: u32 = 0x0FFF_FFFF;

fn put_u16(image: &mut [u8], at: usize, value: u16) {
    image[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(image: &[u8], at: usize) -> Option<u16> {
    let bytes = image.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn get_u32(image: &[u8], at: usize) -> Option<u32> {
    let bytes = image.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// ═══════════════════════════════════════════════════════════════════════════
// Writer
// ═══════════════════════════════════════════════════════════════════════════

/// Zero `image` and write an empty FAT32 volume into it.
pub fn format(image: &mut [u8]) {
    image.fill(0);

    write_boot_sector(&mut image[..SECTOR]);
    write_fsinfo(image, (CLUSTER_COUNT - 1) as u32, (ROOT_CLUSTER + 1) as u32);

    let boot = BACKUP_BOOT_SECTOR * SECTOR;
    image.copy_within(0..2 * SECTOR, boot);

    set_fat(image, 0, 0x0FFF_FF00 | 0xF8);
    set_fat(image, 1, FAT32_EOC);
    set_fat(image, ROOT_CLUSTER, FAT32_EOC);

    let root = cluster_offset(ROOT_CLUSTER);
    let label = &mut image[root..root + DIR_ENTRY_SIZE];
    label[..11].copy_from_slice(VOLUME_LABEL);
    label[11] = ATTR_VOLUME_ID;
    put_u16(label, 22, 0);
    put_u16(label, 24, FIXED_DATE);
}

fn write_boot_sector(boot: &mut [u8]) {
    boot[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    boot[3..11].copy_from_slice(b"MSWIN4.1");
    put_u16(boot, 11, SECTOR as u16);
    boot[13] = 1; // sectors per cluster
    put_u16(boot, 14, RESERVED_SECTORS as u16);
    boot[16] = FAT_COUNT as u8;
    put_u16(boot, 17, 0); // root entries, none on FAT32
    put_u16(boot, 19, DISK_SECTOR_COUNT as u16);
    boot[21] = 0xF8; // fixed disk
    put_u16(boot, 22, 0); // FAT16 size
    put_u16(boot, 24, 63);
    put_u16(boot, 26, 255);
    put_u32(boot, 28, 0);
    put_u32(boot, 32, 0);

    put_u32(boot, 36, FAT_SECTORS as u32);
    put_u16(boot, 40, 0);
    put_u16(boot, 42, 0);
    put_u32(boot, 44, ROOT_CLUSTER as u32);
    put_u16(boot, 48, FSINFO_SECTOR as u16);
    put_u16(boot, 50, BACKUP_BOOT_SECTOR as u16);
    boot[64] = 0x80;
    boot[66] = 0x29;
    put_u32(boot, 67, VOLUME_ID);
    boot[71..82].copy_from_slice(VOLUME_LABEL);
    boot[82..90].copy_from_slice(b"FAT32   ");
    put_u16(boot, 510, 0xAA55);
}

fn write_fsinfo(image: &mut [u8], free: u32, next_free: u32) {
    for sector in [FSINFO_SECTOR, BACKUP_BOOT_SECTOR + FSINFO_SECTOR] {
        let info = &mut image[sector * SECTOR..(sector + 1) * SECTOR];
        put_u32(info, 0, 0x4161_5252);
        put_u32(info, 484, 0x6141_7272);
        put_u32(info, 488, free);
        put_u32(info, 492, next_free);
        put_u32(info, 508, 0xAA55_0000);
    }
}

fn cluster_offset(cluster: usize) -> usize {
    (FIRST_DATA_SECTOR + cluster - 2) * SECTOR
}

fn set_fat(image: &mut [u8], cluster: usize, value: u32) {
    for fat in 0..FAT_COUNT {
        let at = (RESERVED_SECTORS + fat * FAT_SECTORS) * SECTOR + cluster * 4;
        put_u32(image, at, value);
    }
}

fn fat_entry(image: &[u8], cluster: usize) -> u32 {
    get_u32(image, RESERVED_SECTORS * SECTOR + cluster * 4).unwrap_or(FAT32_EOC) & FAT32_MASK
}

/// Short (8.3) directory name plus the `DIR_NTRes` case bits, or `None`
/// when the name needs a long-name entry.
fn short_name(name: &str) -> Option<([u8; 11], u8)> {
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let valid = |part: &str, max: usize| {
        part.len() <= max
            && part
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    };
    if base.is_empty() || !valid(base, 8) || !valid(ext, 3) {
        return None;
    }

    // Mixed case cannot be expressed with the NT bits.
    let case_bits = |part: &str, bit: u8| {
        if part.bytes().any(|b| b.is_ascii_lowercase()) {
            if part.bytes().any(|b| b.is_ascii_uppercase()) {
                None
            } else {
                Some(bit)
            }
        } else {
            Some(0)
        }
    };
    let nt = case_bits(base, NT_LOWER_BASE)? | case_bits(ext, NT_LOWER_EXT)?;

    Some((pack_short(base, ext), nt))
}

/// `~1` alias for a name that needs a long-name entry.
fn alias_name(name: &str) -> [u8; 11] {
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let keep = |part: &str, max: usize| -> String {
        part.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(max)
            .collect()
    };
    let mut base = keep(base, 6);
    base.push_str("~1");
    pack_short(&base, &keep(ext, 3))
}

fn pack_short(base: &str, ext: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    for (slot, b) in out[..8].iter_mut().zip(base.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    for (slot, b) in out[8..].iter_mut().zip(ext.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    out
}

/// Checksum tying long-name entries to their short entry.
pub fn lfn_checksum(short: &[u8; 11]) -> u8 {
    short
        .iter()
        .fold(0u8, |sum, &c| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(c))
}

/// Create `name` in the root directory holding `data`.
///
/// Only meant for a freshly formatted volume: clusters come from the FAT
/// scan and the root directory is not grown.
pub fn create_file(image: &mut [u8], name: &str, data: &[u8]) -> Result<(), Error> {
    let (short, nt, long) = match short_name(name) {
        Some((short, nt)) => (short, nt, None),
        None => (alias_name(name), 0, Some(name)),
    };

    let lfn_entries = long.map_or(0, |n| n.encode_utf16().count().div_ceil(LFN_CHARS));
    let slot = free_dir_slots(image, lfn_entries + 1).ok_or(Error::DiskFull)?;

    // Allocate and link the chain.
    let needed = data.len().div_ceil(SECTOR);
    let clusters: Vec<usize> = (ROOT_CLUSTER + 1..CLUSTER_COUNT + 2)
        .filter(|&c| fat_entry(image, c) == 0)
        .take(needed)
        .collect();
    if clusters.len() < needed {
        return Err(Error::DiskFull);
    }
    for (i, &cluster) in clusters.iter().enumerate() {
        let next = clusters.get(i + 1).map_or(FAT32_EOC, |&n| n as u32);
        set_fat(image, cluster, next);

        let chunk = &data[i * SECTOR..data.len().min((i + 1) * SECTOR)];
        let at = cluster_offset(cluster);
        image[at..at + chunk.len()].copy_from_slice(chunk);
    }

    // Long-name entries are stored last-part first.
    let checksum = lfn_checksum(&short);
    if let Some(long) = long {
        let units: Vec<u16> = long.encode_utf16().collect();
        for k in 0..lfn_entries {
            let ordinal = lfn_entries - k;
            let at = slot + k * DIR_ENTRY_SIZE;
            write_lfn_entry(
                &mut image[at..at + DIR_ENTRY_SIZE],
                ordinal,
                ordinal == lfn_entries,
                &units,
                checksum,
            );
        }
    }

    let first = clusters.first().copied().unwrap_or(0);
    let at = slot + lfn_entries * DIR_ENTRY_SIZE;
    let entry = &mut image[at..at + DIR_ENTRY_SIZE];
    entry[..11].copy_from_slice(&short);
    entry[11] = ATTR_ARCHIVE;
    entry[12] = nt;
    put_u16(entry, 16, FIXED_DATE);
    put_u16(entry, 18, FIXED_DATE);
    put_u16(entry, 20, (first >> 16) as u16);
    put_u16(entry, 24, FIXED_DATE);
    put_u16(entry, 26, first as u16);
    put_u32(entry, 28, data.len() as u32);

    let used = (ROOT_CLUSTER..CLUSTER_COUNT + 2)
        .filter(|&c| fat_entry(image, c) != 0)
        .count();
    let next_free = (ROOT_CLUSTER + 1..CLUSTER_COUNT + 2)
        .find(|&c| fat_entry(image, c) == 0)
        .unwrap_or(0);
    write_fsinfo(image, (CLUSTER_COUNT - used) as u32, next_free as u32);

    debug!("fat: created file ({} bytes, {} cluster(s))", data.len(), needed);
    Ok(())
}

fn write_lfn_entry(entry: &mut [u8], ordinal: usize, last: bool, units: &[u16], checksum: u8) {
    entry[0] = ordinal as u8 | if last { LFN_LAST } else { 0 };
    entry[11] = ATTR_LONG_NAME;
    entry[12] = 0;
    entry[13] = checksum;
    put_u16(entry, 26, 0);

    let start = (ordinal - 1) * LFN_CHARS;
    for (i, &at) in LFN_OFFSETS.iter().enumerate() {
        // Terminated by one NUL, then padded with 0xFFFF.
        let unit = match (start + i).cmp(&units.len()) {
            core::cmp::Ordering::Less => units[start + i],
            core::cmp::Ordering::Equal => 0x0000,
            core::cmp::Ordering::Greater => 0xFFFF,
        };
        put_u16(entry, at, unit);
    }
}

/// Byte offsets of the 13 UCS-2 characters inside a long-name entry.
const LFN_OFFSETS: [usize; LFN_CHARS] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// Offset of `count` consecutive unused entries in the root directory.
fn free_dir_slots(image: &[u8], count: usize) -> Option<usize> {
    let root = cluster_offset(ROOT_CLUSTER);
    let entries = SECTOR / DIR_ENTRY_SIZE;
    let mut run = 0;
    for i in 0..entries {
        let first = image[root + i * DIR_ENTRY_SIZE];
        if first == ENTRY_FREE || first == ENTRY_DELETED {
            run += 1;
            if run == count {
                return Some(root + (i + 1 - count) * DIR_ENTRY_SIZE);
            }
        } else {
            run = 0;
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
// Reader
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatKind {
    Fat12,
    Fat16,
    Fat32,
}

/// Geometry read back from a boot sector.
#[derive(Clone, Copy, Debug)]
pub struct Bpb {
    pub kind: FatKind,
    sectors_per_cluster: usize,
    fat_start: usize,
    root_dir_start: usize,
    root_entries: usize,
    first_data_sector: usize,
    cluster_count: usize,
    root_cluster: usize,
}

impl Bpb {
    /// Parse the boot sector at the start of `image`. Rejects anything that
    /// does not use this disk's sector size or does not fit the image.
    pub fn parse(image: &[u8]) -> Option<Self> {
        if get_u16(image, 510)? != 0xAA55 || get_u16(image, 11)? as usize != SECTOR {
            return None;
        }

        let sectors_per_cluster = *image.get(13)? as usize;
        let reserved = get_u16(image, 14)? as usize;
        let fats = *image.get(16)? as usize;
        let root_entries = get_u16(image, 17)? as usize;
        let total16 = get_u16(image, 19)? as usize;
        let fat16_size = get_u16(image, 22)? as usize;
        let total32 = get_u32(image, 32)? as usize;
        let fat32_size = get_u32(image, 36)? as usize;

        if sectors_per_cluster == 0 || reserved == 0 || fats == 0 {
            return None;
        }

        let fat_size = if fat16_size != 0 { fat16_size } else { fat32_size };
        let total = if total16 != 0 { total16 } else { total32 };
        let root_dir_sectors = (root_entries * DIR_ENTRY_SIZE).div_ceil(SECTOR);
        let root_dir_start = reserved + fats * fat_size;
        let first_data_sector = root_dir_start + root_dir_sectors;
        if total > image.len() / SECTOR || first_data_sector >= total {
            return None;
        }
        let cluster_count = (total - first_data_sector) / sectors_per_cluster;

        // A zero FAT16 size and no fixed root directory mark FAT32 even on
        // volumes too small to reach the FAT32 cluster threshold.
        let kind = if fat16_size == 0 && root_entries == 0 {
            FatKind::Fat32
        } else if cluster_count < 4085 {
            FatKind::Fat12
        } else if cluster_count < 65525 {
            FatKind::Fat16
        } else {
            FatKind::Fat32
        };

        Some(Self {
            kind,
            sectors_per_cluster,
            fat_start: reserved,
            root_dir_start,
            root_entries,
            first_data_sector,
            cluster_count,
            root_cluster: get_u32(image, 44)? as usize & FAT32_MASK as usize,
        })
    }

    fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster * SECTOR
    }

    fn is_data_cluster(&self, cluster: usize) -> bool {
        (2..self.cluster_count + 2).contains(&cluster)
    }

    fn cluster_data<'a>(&self, image: &'a [u8], cluster: usize) -> Option<&'a [u8]> {
        let start = (self.first_data_sector + (cluster - 2) * self.sectors_per_cluster) * SECTOR;
        image.get(start..start + self.cluster_bytes())
    }

    /// Next cluster in the chain, `None` at end of chain or on a bad link.
    fn next_cluster(&self, image: &[u8], cluster: usize) -> Option<usize> {
        let fat = self.fat_start * SECTOR;
        let next = match self.kind {
            FatKind::Fat32 => (get_u32(image, fat + cluster * 4)? & FAT32_MASK) as usize,
            FatKind::Fat16 => get_u16(image, fat + cluster * 2)? as usize,
            FatKind::Fat12 => {
                let pair = get_u16(image, fat + cluster + cluster / 2)?;
                if cluster & 1 == 1 {
                    (pair >> 4) as usize
                } else {
                    (pair & 0x0FFF) as usize
                }
            }
        };
        self.is_data_cluster(next).then_some(next)
    }

    /// Concatenate a cluster chain. The walk is bounded by the cluster
    /// count so a looped chain terminates.
    fn chain(&self, image: &[u8], first: usize, limit: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut cluster = Some(first).filter(|&c| self.is_data_cluster(c));
        let mut steps = 0;
        while let Some(c) = cluster {
            if out.len() >= limit || steps > self.cluster_count {
                break;
            }
            let Some(data) = self.cluster_data(image, c) else {
                break;
            };
            out.extend_from_slice(data);
            steps += 1;
            cluster = self.next_cluster(image, c);
        }
        out
    }

    fn root_directory(&self, image: &[u8]) -> Vec<u8> {
        match self.kind {
            FatKind::Fat32 => self.chain(image, self.root_cluster, usize::MAX),
            FatKind::Fat12 | FatKind::Fat16 => {
                let start = self.root_dir_start * SECTOR;
                let end = start + self.root_entries * DIR_ENTRY_SIZE;
                image.get(start..end).map(<[u8]>::to_vec).unwrap_or_default()
            }
        }
    }
}

/// A file located in the root directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub first_cluster: usize,
    pub size: usize,
}

/// Long name being collected from the entries preceding a short entry.
struct LongName {
    units: [u16; 20 * LFN_CHARS],
    checksum: u8,
    valid: bool,
}

impl LongName {
    fn new() -> Self {
        Self {
            units: [0xFFFF; 20 * LFN_CHARS],
            checksum: 0,
            valid: false,
        }
    }

    fn push(&mut self, entry: &[u8]) {
        let ordinal = (entry[0] & 0x1F) as usize;
        if ordinal == 0 || ordinal > 20 {
            self.valid = false;
            return;
        }
        if entry[0] & LFN_LAST != 0 {
            self.units = [0xFFFF; 20 * LFN_CHARS];
            self.checksum = entry[13];
            self.valid = true;
        } else if entry[13] != self.checksum {
            self.valid = false;
        }
        let start = (ordinal - 1) * LFN_CHARS;
        for (i, &at) in LFN_OFFSETS.iter().enumerate() {
            self.units[start + i] = u16::from_le_bytes([entry[at], entry[at + 1]]);
        }
    }

    fn matches(&self, short: &[u8; 11], name: &str) -> bool {
        if !self.valid || lfn_checksum(short) != self.checksum {
            return false;
        }
        let units = self
            .units
            .iter()
            .copied()
            .take_while(|&u| u != 0x0000 && u != 0xFFFF);
        let decoded: String = char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        decoded.eq_ignore_ascii_case(name)
    }
}

fn short_matches(short: &[u8; 11], name: &str) -> bool {
    let base = core::str::from_utf8(&short[..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&short[8..]).unwrap_or("").trim_end();
    match name.rsplit_once('.') {
        Some((b, e)) => b.eq_ignore_ascii_case(base) && e.eq_ignore_ascii_case(ext),
        None => ext.is_empty() && name.eq_ignore_ascii_case(base),
    }
}

/// Look `name` up in the root directory.
pub fn find_file(image: &[u8], name: &str) -> Option<FileEntry> {
    let bpb = Bpb::parse(image)?;
    let dir = bpb.root_directory(image);
    let mut long = LongName::new();

    for entry in dir.chunks_exact(DIR_ENTRY_SIZE) {
        match entry[0] {
            ENTRY_FREE => break,
            ENTRY_DELETED => {
                long.valid = false;
                continue;
            }
            _ => {}
        }

        let attr = entry[11];
        if attr & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
            long.push(entry);
            continue;
        }

        let mut short = [0u8; 11];
        short.copy_from_slice(&entry[..11]);
        let hit = attr & (ATTR_VOLUME_ID | ATTR_DIRECTORY) == 0
            && (long.matches(&short, name) || short_matches(&short, name));
        long.valid = false;

        if hit {
            let hi = if bpb.kind == FatKind::Fat32 {
                u16::from_le_bytes([entry[20], entry[21]]) as usize
            } else {
                0
            };
            let lo = u16::from_le_bytes([entry[26], entry[27]]) as usize;
            let size = u32::from_le_bytes([entry[28], entry[29], entry[30], entry[31]]);
            return Some(FileEntry {
                first_cluster: (hi << 16) | lo,
                size: size as usize,
            });
        }
    }
    None
}

/// Read a whole file from the root directory. `None` when the file is
/// missing or its chain is shorter than its size.
pub fn read_file(image: &[u8], name: &str) -> Option<Vec<u8>> {
    let entry = find_file(image, name)?;
    if entry.size == 0 {
        return Some(Vec::new());
    }
    let bpb = Bpb::parse(image)?;
    let mut data = bpb.chain(image, entry.first_cluster, entry.size);
    if data.len() < entry.size {
        warn!("fat: chain shorter than file size");
        return None;
    }
    data.truncate(entry.size);
    Some(data)
}
