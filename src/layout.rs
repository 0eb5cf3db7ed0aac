//! Xbox partition table layout engine.
//!
//! The console keeps a fixed 14-slot partition table at LBA 0: five
//! partitions at hard-wired sector offsets (shell, data, three game swap
//! caches), two user partitions F and G whose sizes depend on an
//! allocation policy, and seven blank slots. This module computes and
//! materializes such layouts on whole devices or image files.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use checked_num::CheckedU64;
use log::{debug, info, warn};

use crate::SECTOR_SIZE;
use crate::disk::{ReadOffset, WriteOffset, write_zeroes};
use crate::error::LayoutError;
use crate::format::FormatVolumeOptions;
use crate::volume::Volume;

pub const SECTOR_CONFIG: u32 = 0x0000_0000;
pub const SECTOR_CACHE1: u32 = 0x0000_0400;
pub const SECTOR_CACHE2: u32 = 0x0017_7400;
pub const SECTOR_CACHE3: u32 = 0x002e_e400;
pub const SECTOR_SYSTEM: u32 = 0x0046_5400;
pub const SECTOR_STORE: u32 = 0x0055_f400;
/// First sector past the fixed partitions; user partitions start here.
pub const SECTOR_EXTEND: u32 = 0x00ee_8ab0;

pub const SECTORS_CONFIG: u32 = SECTOR_CACHE1 - SECTOR_CONFIG;
pub const SECTORS_CACHE1: u32 = SECTOR_CACHE2 - SECTOR_CACHE1;
pub const SECTORS_CACHE2: u32 = SECTOR_CACHE3 - SECTOR_CACHE2;
pub const SECTORS_CACHE3: u32 = SECTOR_SYSTEM - SECTOR_CACHE3;
pub const SECTORS_SYSTEM: u32 = SECTOR_STORE - SECTOR_SYSTEM;
pub const SECTORS_STORE: u32 = SECTOR_EXTEND - SECTOR_STORE;

/// Highest sector addressable through 28-bit LBA; the stock kernel
/// cannot reach F data past this without a patched driver.
pub const LBA28_MAX: u32 = 0x0fff_ffff;

pub const TABLE_MAGIC: [u8; 16] = *b"****PARTINFO****";
pub const ENTRY_COUNT: usize = 14;

/// Firmware brand marker written into the config region.
pub const BRAND_MAGIC: [u8; 4] = *b"BRFR";
pub const BRAND_OFFSET: u64 = 0x600;

bitflags! {
    /// Flag bits of a partition table entry.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PartitionFlags: u32 {
        const IN_USE = 0x8000_0000;
    }
}

/// One 32-byte slot of the partition table.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PartitionEntry {
    /// Partition name in ASCII, space padded, not terminated.
    pub name: [u8; 16],
    pub flags: u32,
    pub lba_start: u32,
    pub lba_size: u32,
    pub _reserved: u32,
}

impl PartitionEntry {
    fn new(name: &str, flags: PartitionFlags, lba_start: u32, lba_size: u32) -> PartitionEntry {
        debug_assert!(name.len() <= 16);
        let mut name_bytes = [b' '; 16];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        PartitionEntry {
            name: name_bytes,
            flags: flags.bits().to_le(),
            lba_start: lba_start.to_le(),
            lba_size: lba_size.to_le(),
            _reserved: 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.flags().contains(PartitionFlags::IN_USE)
    }

    pub fn flags(&self) -> PartitionFlags {
        PartitionFlags::from_bits_truncate(u32::from_le(self.flags))
    }

    pub fn lba_start(&self) -> u32 {
        u32::from_le(self.lba_start)
    }

    pub fn lba_size(&self) -> u32 {
        u32::from_le(self.lba_size)
    }

    /// Name with the space padding stripped.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name)
            .trim_end_matches(' ')
            .to_string()
    }

    /// Byte offset of the partition start.
    pub fn byte_start(&self) -> u64 {
        self.lba_start() as u64 * SECTOR_SIZE
    }

    /// Partition size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.lba_size() as u64 * SECTOR_SIZE
    }

    fn enable(&mut self, lba_start: u32, lba_size: u32) {
        self.flags = (self.flags() | PartitionFlags::IN_USE).bits().to_le();
        self.lba_start = lba_start.to_le();
        self.lba_size = lba_size.to_le();
    }

    fn disable(&mut self) {
        self.flags = (self.flags() - PartitionFlags::IN_USE).bits().to_le();
        self.lba_size = 0;
    }
}

/// The on-disk partition table at LBA 0.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PartitionTable {
    pub magic: [u8; 16],
    pub _reserved: [u8; 32],
    pub entries: [PartitionEntry; ENTRY_COUNT],
}

pub const TABLE_SIZE: usize = size_of::<PartitionTable>();

impl PartitionTable {
    /// Builds the default table: the five fixed partitions in use at
    /// their hard-wired offsets, F and G present but disabled, the rest
    /// blank.
    pub fn with_fixed_partitions() -> PartitionTable {
        let in_use = PartitionFlags::IN_USE;
        let off = PartitionFlags::empty();
        let blank = PartitionEntry::new("", off, 0, 0);
        PartitionTable {
            magic: TABLE_MAGIC,
            _reserved: [0; 32],
            entries: [
                PartitionEntry::new("XBOX SHELL", in_use, SECTOR_STORE, SECTORS_STORE),
                PartitionEntry::new("XBOX DATA", in_use, SECTOR_SYSTEM, SECTORS_SYSTEM),
                PartitionEntry::new("XBOX GAME SWAP 1", in_use, SECTOR_CACHE1, SECTORS_CACHE1),
                PartitionEntry::new("XBOX GAME SWAP 2", in_use, SECTOR_CACHE2, SECTORS_CACHE2),
                PartitionEntry::new("XBOX GAME SWAP 3", in_use, SECTOR_CACHE3, SECTORS_CACHE3),
                PartitionEntry::new("XBOX F", off, SECTOR_EXTEND, 0),
                PartitionEntry::new("XBOX G", off, SECTOR_EXTEND, 0),
                blank,
                blank,
                blank,
                blank,
                blank,
                blank,
                blank,
            ],
        }
    }

    /// Decodes a table read from disk. The magic is checked strictly
    /// first; a table whose magic merely contains `PARTINFO` is accepted
    /// with a warning, as some dashboards rewrite the framing bytes.
    pub fn decode(bytes: &[u8]) -> Result<PartitionTable, LayoutError> {
        if bytes.len() < TABLE_SIZE {
            return Err(LayoutError::BadMagic);
        }
        let table: PartitionTable = bytemuck::pod_read_unaligned(&bytes[..TABLE_SIZE]);
        if table.magic != TABLE_MAGIC {
            if !table
                .magic
                .windows(8)
                .any(|window| window == b"PARTINFO")
            {
                return Err(LayoutError::BadMagic);
            }
            warn!("partition table magic only matched the relaxed compare");
        }
        Ok(table)
    }

    pub fn encode(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }

    /// Reads the table from LBA 0 of a device.
    pub fn read_from<D: ReadOffset + ?Sized>(dev: &mut D) -> Result<PartitionTable, LayoutError> {
        let mut bytes = vec![0u8; TABLE_SIZE];
        dev.read_exact_at(0, &mut bytes)?;
        PartitionTable::decode(&bytes)
    }

    /// Writes the table to LBA 0 of a device.
    pub fn write_to<D: WriteOffset + ?Sized>(&self, dev: &mut D) -> Result<(), LayoutError> {
        dev.write_all_at(0, &self.encode())?;
        Ok(())
    }

    /// Entries with the in-use flag set, with their slot indexes.
    pub fn in_use(&self) -> impl Iterator<Item = (usize, &PartitionEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.is_in_use())
    }
}

/// How the sectors past the fixed region are handed out to the F and G
/// user partitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// F takes the free region up to the 28-bit LBA ceiling; G stays
    /// disabled. Safe with a stock kernel.
    Capped,
    /// F takes the whole free region, ignoring the LBA ceiling.
    All,
    /// F capped as in `Capped`; G takes whatever remains past it.
    Rest,
    /// F and G split the free region in half; F gets the floor of the
    /// split, G the remainder.
    Even,
    /// F takes the given percentage of the free region, G the rest.
    Percentage(u8),
}

/// Fills in the F and G entries of `table` for a device of
/// `total_sectors` sectors according to `policy`. The fixed entries are
/// left untouched.
pub fn plan_user_partitions(
    table: &mut PartitionTable,
    total_sectors: u64,
    policy: AllocationPolicy,
) -> Result<(), LayoutError> {
    if total_sectors <= SECTOR_EXTEND as u64 {
        return Err(LayoutError::DeviceTooSmall(total_sectors));
    }
    let free = total_sectors - SECTOR_EXTEND as u64;
    let f_ceiling = (LBA28_MAX - SECTOR_EXTEND) as u64;

    let (f_sectors, g_sectors) = match policy {
        AllocationPolicy::Capped => (free.min(f_ceiling), 0),
        AllocationPolicy::All => (free, 0),
        AllocationPolicy::Rest => {
            let f = free.min(f_ceiling);
            (f, free - f)
        }
        AllocationPolicy::Even => (free / 2, free - free / 2),
        AllocationPolicy::Percentage(percent) => {
            if percent > 100 {
                return Err(LayoutError::InvalidPercent(percent));
            }
            let f = ((CheckedU64::new(free) * percent as u64) / 100)
                .ok_or(LayoutError::Overflow)?;
            (f, free - f)
        }
    };

    // the table fields are 32 bits wide
    let f_sectors = f_sectors.min(u32::MAX as u64) as u32;
    let g_sectors = g_sectors.min(u32::MAX as u64) as u32;

    if f_sectors > 0 {
        table.entries[5].enable(SECTOR_EXTEND, f_sectors);
    } else {
        table.entries[5].disable();
    }
    if g_sectors > 0 {
        let g_start = u32::try_from(SECTOR_EXTEND as u64 + f_sectors as u64)
            .map_err(|_| LayoutError::Overflow)?;
        table.entries[6].enable(g_start, g_sectors);
    } else {
        table.entries[6].disable();
    }

    debug!(
        "planned user partitions: F {} sectors at {:#x}, G {} sectors",
        f_sectors, SECTOR_EXTEND, g_sectors
    );
    Ok(())
}

/// Lays out and materializes a whole device: zeroes the config region,
/// writes the brand marker and the partition table, then creates FATX
/// volumes on the planned partitions.
///
/// With `include_fixed` the five fixed partitions are formatted too;
/// otherwise only the user partitions are, leaving existing fixed
/// filesystems alone.
pub fn prepare_device<D: ReadOffset + WriteOffset>(
    dev: &mut D,
    total_sectors: u64,
    policy: AllocationPolicy,
    include_fixed: bool,
) -> Result<PartitionTable, LayoutError> {
    let mut table = PartitionTable::with_fixed_partitions();
    plan_user_partitions(&mut table, total_sectors, policy)?;

    write_zeroes(dev, 0, SECTORS_CONFIG as u64 * SECTOR_SIZE)?;
    dev.write_all_at(BRAND_OFFSET, &BRAND_MAGIC)?;
    table.write_to(dev)?;

    for (index, entry) in table.in_use() {
        if index < 5 && !include_fixed {
            continue;
        }
        info!(
            "creating partition {} ({}) at {:#x}, {} sectors",
            index,
            entry.name(),
            entry.lba_start(),
            entry.lba_size()
        );
        let options = FormatVolumeOptions {
            offset: entry.byte_start(),
            size: entry.byte_size(),
            tier: None,
            zero_fill: false,
        };
        Volume::create(&mut *dev, options)?;
    }
    Ok(table)
}

/// Asks the kernel to re-read the partition table of a block device.
/// Best effort; failure is logged and ignored.
#[cfg(target_os = "linux")]
pub fn reread_partition_table(device: &std::fs::File) {
    use std::os::fd::AsRawFd;

    const BLKRRPART: libc::c_ulong = 0x125f;
    let rc = unsafe { libc::ioctl(device.as_raw_fd(), BLKRRPART as _) };
    if rc != 0 {
        warn!(
            "BLKRRPART failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn reread_partition_table(_device: &std::fs::File) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_layout() {
        assert_eq!(size_of::<PartitionEntry>(), 32);
        assert_eq!(TABLE_SIZE, 16 + 32 + 14 * 32);
    }

    #[test]
    fn fixed_entries_are_contiguous() {
        let table = PartitionTable::with_fixed_partitions();
        assert_eq!(table.entries[0].name(), "XBOX SHELL");
        assert_eq!(table.entries[1].name(), "XBOX DATA");
        assert_eq!(table.entries[2].name(), "XBOX GAME SWAP 1");
        // caches run back to back up to the system partition
        assert_eq!(
            table.entries[2].lba_start() + table.entries[2].lba_size(),
            table.entries[3].lba_start()
        );
        assert_eq!(
            table.entries[4].lba_start() + table.entries[4].lba_size(),
            table.entries[1].lba_start()
        );
        assert_eq!(
            table.entries[0].lba_start() + table.entries[0].lba_size(),
            SECTOR_EXTEND
        );
        assert_eq!(table.in_use().count(), 5);
    }

    #[test]
    fn even_split_rounds_toward_g() {
        let mut table = PartitionTable::with_fixed_partitions();
        let total = SECTOR_EXTEND as u64 + 1001;
        plan_user_partitions(&mut table, total, AllocationPolicy::Even).unwrap();

        let f = &table.entries[5];
        let g = &table.entries[6];
        assert!(f.is_in_use() && g.is_in_use());
        assert_eq!(f.lba_size(), 500);
        assert_eq!(g.lba_size(), 501);
        assert_eq!(f.lba_start(), SECTOR_EXTEND);
        assert_eq!(g.lba_start(), SECTOR_EXTEND + 500);
    }

    #[test]
    fn capped_policy_stops_at_lba28() {
        let mut table = PartitionTable::with_fixed_partitions();
        // well past the 28-bit limit
        let total = 2 * LBA28_MAX as u64;
        plan_user_partitions(&mut table, total, AllocationPolicy::Capped).unwrap();

        let f = &table.entries[5];
        assert_eq!(f.lba_size(), LBA28_MAX - SECTOR_EXTEND);
        assert!(!table.entries[6].is_in_use());
        assert_eq!(table.entries[6].lba_size(), 0);
    }

    #[test]
    fn rest_policy_gives_g_the_overflow() {
        let mut table = PartitionTable::with_fixed_partitions();
        let total = LBA28_MAX as u64 + 5000;
        plan_user_partitions(&mut table, total, AllocationPolicy::Rest).unwrap();

        let f = &table.entries[5];
        let g = &table.entries[6];
        assert_eq!(f.lba_size(), LBA28_MAX - SECTOR_EXTEND);
        assert_eq!(g.lba_start(), LBA28_MAX);
        assert_eq!(g.lba_size(), 5000);
    }

    #[test]
    fn all_policy_ignores_the_ceiling() {
        let mut table = PartitionTable::with_fixed_partitions();
        let total = LBA28_MAX as u64 + 5000;
        plan_user_partitions(&mut table, total, AllocationPolicy::All).unwrap();

        let f = &table.entries[5];
        assert_eq!(f.lba_size() as u64, total - SECTOR_EXTEND as u64);
        assert!(!table.entries[6].is_in_use());
    }

    #[test]
    fn percentage_policy_splits_the_free_region() {
        let mut table = PartitionTable::with_fixed_partitions();
        let total = SECTOR_EXTEND as u64 + 1000;
        plan_user_partitions(&mut table, total, AllocationPolicy::Percentage(30)).unwrap();

        assert_eq!(table.entries[5].lba_size(), 300);
        assert_eq!(table.entries[6].lba_size(), 700);

        let err = plan_user_partitions(&mut table, total, AllocationPolicy::Percentage(101));
        assert!(matches!(err, Err(LayoutError::InvalidPercent(101))));
    }

    #[test]
    fn zero_size_user_partitions_stay_disabled() {
        // a zero-percent F must not end up flagged in-use with no sectors
        let mut table = PartitionTable::with_fixed_partitions();
        let total = SECTOR_EXTEND as u64 + 1000;
        plan_user_partitions(&mut table, total, AllocationPolicy::Percentage(0)).unwrap();

        assert!(!table.entries[5].is_in_use());
        assert_eq!(table.entries[5].lba_size(), 0);
        assert_eq!(table.entries[6].lba_size(), 1000);

        // an even split of a single free sector leaves F empty too
        let mut table = PartitionTable::with_fixed_partitions();
        plan_user_partitions(&mut table, SECTOR_EXTEND as u64 + 1, AllocationPolicy::Even).unwrap();
        assert!(!table.entries[5].is_in_use());
        let g = &table.entries[6];
        assert!(g.is_in_use());
        assert_eq!(g.lba_start(), SECTOR_EXTEND);
        assert_eq!(g.lba_size(), 1);
    }

    #[test]
    fn rejects_devices_inside_the_fixed_region() {
        let mut table = PartitionTable::with_fixed_partitions();
        let err = plan_user_partitions(&mut table, SECTOR_EXTEND as u64, AllocationPolicy::All);
        assert!(matches!(err, Err(LayoutError::DeviceTooSmall(_))));
    }

    #[test]
    fn decode_accepts_relaxed_magic() {
        let mut table = PartitionTable::with_fixed_partitions();
        table.magic = *b"xxxxPARTINFOxxxx";
        let bytes = table.encode();
        assert!(PartitionTable::decode(&bytes).is_ok());

        let mut garbage = bytes.clone();
        garbage[..16].fill(0);
        assert!(matches!(
            PartitionTable::decode(&garbage),
            Err(LayoutError::BadMagic)
        ));
    }
}
