use derive_builder::Builder;

use crate::SECTOR_SIZE;

/// Byte threshold above which a partition needs 32 KiB clusters.
pub const TIER_256GB_BYTES: u64 = 256_000_000_000;
/// Byte threshold above which a partition needs 64 KiB clusters.
pub const TIER_512GB_BYTES: u64 = 512_000_000_000;

/// Cluster size tier of a FATX volume, selected by partition capacity.
///
/// The same thresholds bound the partition sizes the layout engine may
/// hand out, so the two stay in agreement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClusterTier {
    /// 16 KiB clusters, partitions below 256 GB.
    K16,
    /// 32 KiB clusters, partitions of 256 GB and above.
    K32,
    /// 64 KiB clusters, partitions of 512 GB and above.
    K64,
}

impl ClusterTier {
    /// Tier required for a partition of the given byte size.
    pub fn for_volume_size(bytes: u64) -> ClusterTier {
        if bytes >= TIER_512GB_BYTES {
            ClusterTier::K64
        } else if bytes >= TIER_256GB_BYTES {
            ClusterTier::K32
        } else {
            ClusterTier::K16
        }
    }

    /// Tier required for a partition of the given sector count.
    pub fn for_lba_size(sectors: u64) -> ClusterTier {
        ClusterTier::for_volume_size(sectors * SECTOR_SIZE)
    }

    /// Recovers the tier from a superblock's sectors-per-cluster field.
    pub fn from_sectors_per_cluster(sectors: u32) -> Option<ClusterTier> {
        match sectors {
            0x20 => Some(ClusterTier::K16),
            0x40 => Some(ClusterTier::K32),
            0x80 => Some(ClusterTier::K64),
            _ => None,
        }
    }

    pub fn cluster_size(self) -> u32 {
        match self {
            ClusterTier::K16 => 0x4000,
            ClusterTier::K32 => 0x8000,
            ClusterTier::K64 => 0x10000,
        }
    }

    pub fn sectors_per_cluster(self) -> u32 {
        self.cluster_size() / SECTOR_SIZE as u32
    }
}

/// Options for creating a fresh FATX volume.
#[derive(Copy, Clone, Debug, Builder)]
pub struct FormatVolumeOptions {
    /// Byte offset of the partition within the backing store.
    pub offset: u64,
    /// Partition size in bytes.
    pub size: u64,
    /// Cluster size tier. Defaults to the capacity tier of `size`.
    #[builder(default)]
    pub tier: Option<ClusterTier>,
    /// Zero the whole partition region instead of only the on-disk
    /// structures. Slow on real devices.
    #[builder(default)]
    pub zero_fill: bool,
}

impl FormatVolumeOptions {
    pub(crate) fn effective_tier(&self) -> ClusterTier {
        self.tier
            .unwrap_or_else(|| ClusterTier::for_volume_size(self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_thresholds() {
        assert_eq!(ClusterTier::for_volume_size(0), ClusterTier::K16);
        assert_eq!(
            ClusterTier::for_volume_size(TIER_256GB_BYTES - 1),
            ClusterTier::K16
        );
        assert_eq!(
            ClusterTier::for_volume_size(TIER_256GB_BYTES),
            ClusterTier::K32
        );
        assert_eq!(
            ClusterTier::for_volume_size(TIER_512GB_BYTES),
            ClusterTier::K64
        );
    }

    #[test]
    fn sector_and_byte_thresholds_agree() {
        assert_eq!(ClusterTier::for_lba_size(500_000_000), ClusterTier::K32);
        assert_eq!(ClusterTier::for_lba_size(499_999_999), ClusterTier::K16);
        assert_eq!(ClusterTier::for_lba_size(1_000_000_000), ClusterTier::K64);
    }

    #[test]
    fn tier_defaults_to_16k_for_small_or_unknown_sizes() {
        let options = FormatVolumeOptionsBuilder::default()
            .offset(0)
            .size(0)
            .build()
            .unwrap();
        assert_eq!(options.effective_tier(), ClusterTier::K16);
        assert_eq!(options.effective_tier().cluster_size(), 0x4000);
    }

    #[test]
    fn sectors_per_cluster_field_values() {
        assert_eq!(ClusterTier::K16.sectors_per_cluster(), 0x20);
        assert_eq!(ClusterTier::K32.sectors_per_cluster(), 0x40);
        assert_eq!(ClusterTier::K64.sectors_per_cluster(), 0x80);
        assert_eq!(
            ClusterTier::from_sectors_per_cluster(0x40),
            Some(ClusterTier::K32)
        );
        assert_eq!(ClusterTier::from_sectors_per_cluster(3), None);
    }
}
