use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::timestamp::DosDateTime;

/// Fixed size of an on-disk directory entry.
pub const DIR_ENTRY_SIZE: usize = 0x40;

/// Longest permitted filename, in bytes.
pub const NAME_MAX: usize = 42;

/// Name-length byte marking the end of a directory. A zeroed entry (0x00)
/// terminates just like the 0xFF fill value.
const END_OF_DIRECTORY_FREE: u8 = 0x00;
const END_OF_DIRECTORY_FILL: u8 = 0xff;

/// Name-length byte of a deleted entry.
const DELETED_ENTRY: u8 = 0xe5;

bitflags! {
    /// FAT-style attribute bits of a directory entry.
    #[derive(Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq)]
    pub struct FileAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// Raw on-disk directory entry record.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct RawDirEntry {
    /// Length of `name` in bytes, or one of the sentinel values.
    pub name_len: u8,
    /// Attribute bits as on FAT.
    pub attributes: u8,
    /// Filename in ASCII, `0xFF` padded, not terminated.
    pub name: [u8; NAME_MAX],
    /// First cluster of the file or directory data.
    pub first_cluster: u32,
    /// File size in bytes. Zero for directories by convention.
    pub file_size: u32,
    pub mod_time: u16,
    pub mod_date: u16,
    pub create_time: u16,
    pub create_date: u16,
    pub access_time: u16,
    pub access_date: u16,
}

impl RawDirEntry {
    pub fn new(name: &str, attributes: FileAttributes, first_cluster: u32, file_size: u32) -> RawDirEntry {
        debug_assert!(!name.is_empty() && name.len() <= NAME_MAX);
        let mut name_bytes = [0xffu8; NAME_MAX];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        RawDirEntry {
            name_len: name.len() as u8,
            attributes: attributes.bits(),
            name: name_bytes,
            first_cluster: first_cluster.to_le(),
            file_size: file_size.to_le(),
            mod_time: 0,
            mod_date: 0,
            create_time: 0,
            create_date: 0,
            access_time: 0,
            access_date: 0,
        }
    }
}

/// One decoded slot of a directory cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSlot {
    /// End-of-directory sentinel: the whole chain stops here.
    End,
    /// Tombstoned entry, skipped during scans.
    Deleted,
    Entry(DirEntry),
}

/// A live directory entry with its fields decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attributes: FileAttributes,
    pub first_cluster: u32,
    pub file_size: u32,
    pub modified: DosDateTime,
    pub created: DosDateTime,
    pub accessed: DosDateTime,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    /// File size for display: forced to zero for directories.
    pub fn display_size(&self) -> u32 {
        if self.is_directory() { 0 } else { self.file_size }
    }

    /// Four-character attribute string, one column per bit: `R`, `H`,
    /// `S`, `A`, with a space for each unset bit.
    pub fn flags_string(&self) -> String {
        [
            (FileAttributes::READ_ONLY, 'R'),
            (FileAttributes::HIDDEN, 'H'),
            (FileAttributes::SYSTEM, 'S'),
            (FileAttributes::ARCHIVE, 'A'),
        ]
        .iter()
        .map(|&(bit, c)| if self.attributes.contains(bit) { c } else { ' ' })
        .collect()
    }

    /// Case-insensitive name comparison used by path resolution. No
    /// Unicode normalization; names are ASCII on disk.
    pub fn name_matches(&self, needle: &str) -> bool {
        self.name.eq_ignore_ascii_case(needle)
    }
}

fn decode_slot(raw: &RawDirEntry) -> DirSlot {
    match raw.name_len {
        END_OF_DIRECTORY_FREE | END_OF_DIRECTORY_FILL => DirSlot::End,
        DELETED_ENTRY => DirSlot::Deleted,
        len => {
            // padding past `name_len` is undefined; a length beyond the
            // field width is clamped rather than trusted
            let len = (len as usize).min(NAME_MAX);
            let name = String::from_utf8_lossy(&raw.name[..len]).into_owned();
            DirSlot::Entry(DirEntry {
                name,
                attributes: FileAttributes::from_bits_truncate(raw.attributes),
                first_cluster: u32::from_le(raw.first_cluster),
                file_size: u32::from_le(raw.file_size),
                modified: DosDateTime::from_parts(u16::from_le(raw.mod_date), u16::from_le(raw.mod_time)),
                created: DosDateTime::from_parts(
                    u16::from_le(raw.create_date),
                    u16::from_le(raw.create_time),
                ),
                accessed: DosDateTime::from_parts(
                    u16::from_le(raw.access_date),
                    u16::from_le(raw.access_time),
                ),
            })
        }
    }
}

/// Bounds-checked cursor over the fixed-size records of one directory
/// cluster.
pub struct DirCursor<'a> {
    cluster: &'a [u8],
    index: usize,
}

impl<'a> DirCursor<'a> {
    pub fn new(cluster: &'a [u8]) -> DirCursor<'a> {
        DirCursor { cluster, index: 0 }
    }

    /// Decodes the next record, or `None` once the cluster's records are
    /// exhausted (the caller then advances along the cluster chain).
    pub fn next_slot(&mut self) -> Option<DirSlot> {
        let offset = self.index.checked_mul(DIR_ENTRY_SIZE)?;
        let bytes = self.cluster.get(offset..offset + DIR_ENTRY_SIZE)?;
        self.index += 1;
        let raw: RawDirEntry = bytemuck::pod_read_unaligned(bytes);
        Some(decode_slot(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        assert_eq!(size_of::<RawDirEntry>(), DIR_ENTRY_SIZE);
    }

    fn cluster_with(entries: &[RawDirEntry], fill: u8) -> Vec<u8> {
        let mut cluster = vec![fill; 0x4000];
        for (i, e) in entries.iter().enumerate() {
            cluster[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE]
                .copy_from_slice(bytemuck::bytes_of(e));
        }
        cluster
    }

    #[test]
    fn decodes_live_entry() {
        let raw = RawDirEntry::new(
            "Save.bin",
            FileAttributes::ARCHIVE | FileAttributes::READ_ONLY,
            7,
            1234,
        );
        let cluster = cluster_with(&[raw], 0xff);
        let mut cursor = DirCursor::new(&cluster);

        let DirSlot::Entry(entry) = cursor.next_slot().unwrap() else {
            panic!("expected a live entry");
        };
        assert_eq!(entry.name, "Save.bin");
        assert_eq!(entry.first_cluster, 7);
        assert_eq!(entry.file_size, 1234);
        assert!(!entry.is_directory());
        assert_eq!(entry.flags_string(), "R  A");

        assert_eq!(cursor.next_slot().unwrap(), DirSlot::End);
    }

    #[test]
    fn sentinels_and_tombstones() {
        let mut deleted = RawDirEntry::new("gone", FileAttributes::empty(), 3, 0);
        deleted.name_len = 0xe5;
        let cluster = cluster_with(&[deleted], 0x00);
        let mut cursor = DirCursor::new(&cluster);

        assert_eq!(cursor.next_slot().unwrap(), DirSlot::Deleted);
        // zeroed slot terminates like 0xff fill
        assert_eq!(cursor.next_slot().unwrap(), DirSlot::End);
    }

    #[test]
    fn cursor_stops_at_cluster_end() {
        let live = RawDirEntry::new("x", FileAttributes::DIRECTORY, 2, 0);
        let mut cluster = cluster_with(&[live], 0x00);
        cluster.truncate(DIR_ENTRY_SIZE);
        let mut cursor = DirCursor::new(&cluster);

        assert!(matches!(cursor.next_slot(), Some(DirSlot::Entry(_))));
        assert_eq!(cursor.next_slot(), None);
    }

    #[test]
    fn directory_size_is_displayed_as_zero() {
        let raw = RawDirEntry::new("Games", FileAttributes::DIRECTORY, 5, 9999);
        let cluster = cluster_with(&[raw], 0xff);
        let DirSlot::Entry(entry) = DirCursor::new(&cluster).next_slot().unwrap() else {
            panic!("expected a live entry");
        };
        assert!(entry.is_directory());
        assert_eq!(entry.display_size(), 0);
        assert_eq!(entry.file_size, 9999);
    }

    #[test]
    fn name_matching_is_ascii_case_insensitive() {
        let raw = RawDirEntry::new("Save.BIN", FileAttributes::empty(), 2, 1);
        let cluster = cluster_with(&[raw], 0xff);
        let DirSlot::Entry(entry) = DirCursor::new(&cluster).next_slot().unwrap() else {
            panic!("expected a live entry");
        };
        assert!(entry.name_matches("save.bin"));
        assert!(entry.name_matches("SAVE.bin"));
        assert!(!entry.name_matches("save"));
    }
}
