use std::time::{SystemTime, UNIX_EPOCH};

use bytemuck::{Pod, Zeroable};

use crate::error::FatxError;
use crate::format::ClusterTier;

/// "FATX", stored as a little-endian u32 at the start of the volume.
pub const FATX_MAGIC: u32 = 0x5854_4146;

/// The volume header occupies one 4096-byte block at the partition start.
pub const SUPERBLOCK_SIZE: usize = 0x1000;

/// On-disk FATX volume header. Only the first 18 bytes carry data; the
/// remainder of the 4096-byte block is `0xFF` padding.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct Superblock {
    /// Must be `FATX` (`0x58544146` little-endian).
    pub magic: u32,

    /// Volume id, derived from the creation time.
    pub volume_id: u32,

    /// Cluster size in 512-byte sectors: `0x20`, `0x40` or `0x80`.
    pub sectors_per_cluster: u32,

    /// Number of active FATs. Always 1.
    pub fat_copies: u16,

    /// Always zero.
    pub _reserved: u32,
}

impl Superblock {
    /// Builds a header for a fresh volume, stamping the current time as
    /// the volume id.
    pub fn try_new(tier: ClusterTier) -> Result<Superblock, FatxError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(FatxError::VolumeId)?;
        Ok(Superblock {
            magic: FATX_MAGIC.to_le(),
            volume_id: (now.as_secs() as u32).to_le(),
            sectors_per_cluster: tier.sectors_per_cluster().to_le(),
            fat_copies: 1u16.to_le(),
            _reserved: 0,
        })
    }

    /// Decodes the header from the start of a 4096-byte block, failing on
    /// a magic mismatch.
    pub fn decode(block: &[u8]) -> Result<Superblock, FatxError> {
        let bytes = block
            .get(..size_of::<Superblock>())
            .ok_or(FatxError::BadMagic)?;
        let raw: Superblock = bytemuck::pod_read_unaligned(bytes);
        if u32::from_le(raw.magic) != FATX_MAGIC {
            return Err(FatxError::BadMagic);
        }
        Ok(raw)
    }

    /// Encodes the full 4096-byte header block.
    pub fn encode(&self) -> Vec<u8> {
        let mut block = vec![0xffu8; SUPERBLOCK_SIZE];
        block[..size_of::<Superblock>()].copy_from_slice(bytemuck::bytes_of(self));
        block
    }

    pub fn cluster_size(&self) -> u32 {
        u32::from_le(self.sectors_per_cluster) * crate::SECTOR_SIZE as u32
    }
}
