use log::{debug, info};

use crate::chain::{ChainMap, ROOT_CLUSTER};
use crate::disk::{ReadOffset, WriteOffset, write_zeroes};
use crate::error::{ChainError, FatxError};
use crate::format::{ClusterTier, FormatVolumeOptions};
use crate::superblock::{SUPERBLOCK_SIZE, Superblock};

/// An open or freshly created FATX partition.
///
/// The whole chain map is held in memory; cluster data is read and
/// written on demand with no caching, so deep traversals re-read hot
/// clusters rather than growing the footprint.
pub struct Volume<D> {
    disk: D,
    start: u64,
    size: u64,
    cluster_size: u32,
    cluster_count: u32,
    cluster1_address: u64,
    chain: ChainMap,
}

impl<D> Volume<D> {
    /// Byte offset of this partition within the backing store.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Partition size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Byte address of cluster 1, right after the header and chain table.
    pub fn cluster1_address(&self) -> u64 {
        self.cluster1_address
    }

    pub fn chain(&self) -> &ChainMap {
        &self.chain
    }

    /// Successor of `id` in the cluster chain, or `None` at end of chain.
    pub fn next_cluster(&self, id: u32) -> Result<Option<u32>, ChainError> {
        self.chain.next(id)
    }

    /// Releases the volume, handing back the backing store. Nothing is
    /// flushed here; a create path flushes as it goes.
    pub fn into_inner(self) -> D {
        self.disk
    }

    fn cluster_address(&self, id: u32) -> Result<u64, FatxError> {
        if id < ROOT_CLUSTER {
            return Err(ChainError::InvalidCluster(id).into());
        }
        Ok(self.cluster1_address + (id - ROOT_CLUSTER) as u64 * self.cluster_size as u64)
    }
}

impl<D: ReadOffset> Volume<D> {
    /// Opens an existing FATX partition of `size` bytes at `offset`.
    ///
    /// The cluster size is fixed at 16 KiB on this path; the chain map is
    /// sized from `size` and loaded fully into memory.
    pub fn open(mut disk: D, offset: u64, size: u64) -> Result<Volume<D>, FatxError> {
        let mut header = vec![0u8; SUPERBLOCK_SIZE];
        disk.read_exact_at(offset, &mut header)?;
        let superblock = Superblock::decode(&header)?;

        let cluster_size = ClusterTier::K16.cluster_size();
        if superblock.cluster_size() != cluster_size {
            debug!(
                "superblock advertises {} byte clusters, using {}",
                superblock.cluster_size(),
                cluster_size
            );
        }
        if size < cluster_size as u64 {
            return Err(FatxError::InvalidVolumeSize(size));
        }

        let cluster_count = (size / cluster_size as u64) as u32;
        let table_size = ChainMap::table_size(cluster_count);
        let mut table = vec![0u8; table_size as usize];
        disk.read_exact_at(offset + SUPERBLOCK_SIZE as u64, &mut table)?;
        let chain = ChainMap::from_bytes(cluster_count, &table);

        let volume = Volume {
            disk,
            start: offset,
            size,
            cluster_size,
            cluster_count,
            cluster1_address: offset + SUPERBLOCK_SIZE as u64 + table_size,
            chain,
        };
        debug!(
            "opened volume: {} clusters of {} bytes, {} byte chain entries, table {} bytes",
            volume.cluster_count,
            volume.cluster_size,
            ChainMap::entry_width(volume.cluster_count),
            table_size
        );
        Ok(volume)
    }

    /// Reads one whole cluster. Every call is an I/O round trip.
    pub fn read_cluster(&mut self, id: u32) -> Result<Vec<u8>, FatxError> {
        let address = self.cluster_address(id)?;
        let mut data = vec![0u8; self.cluster_size as usize];
        self.disk.read_exact_at(address, &mut data)?;
        Ok(data)
    }
}

impl<D: ReadOffset + WriteOffset> Volume<D> {
    /// Creates a fresh FATX partition: header, minimal chain map with
    /// zero padding, and a blank root directory cluster.
    ///
    /// The caller must have exclusive access to the region; a partially
    /// completed create leaves it corrupt.
    pub fn create(mut disk: D, options: FormatVolumeOptions) -> Result<Volume<D>, FatxError> {
        let tier = options.effective_tier();
        let cluster_size = tier.cluster_size();
        if options.size < cluster_size as u64 {
            return Err(FatxError::InvalidVolumeSize(options.size));
        }

        let cluster_count = (options.size / cluster_size as u64) as u32;
        let table_size = ChainMap::table_size(cluster_count);
        let superblock = Superblock::try_new(tier)?;

        if options.zero_fill {
            write_zeroes(&mut disk, options.offset, options.size)?;
        }
        disk.write_all_at(options.offset, &superblock.encode())?;

        let mut volume = Volume {
            disk,
            start: options.offset,
            size: options.size,
            cluster_size,
            cluster_count,
            cluster1_address: options.offset + SUPERBLOCK_SIZE as u64 + table_size,
            chain: ChainMap::new_empty(cluster_count),
        };
        volume.flush_chain_map()?;

        // blank root directory
        let empty = vec![0u8; cluster_size as usize];
        volume.write_cluster(ROOT_CLUSTER, &empty)?;

        info!(
            "created volume at {:#x}: {} clusters of {} bytes, {} byte chain entries",
            volume.start,
            volume.cluster_count,
            volume.cluster_size,
            ChainMap::entry_width(volume.cluster_count)
        );
        Ok(volume)
    }

    /// Writes one whole cluster.
    pub fn write_cluster(&mut self, id: u32, data: &[u8]) -> Result<(), FatxError> {
        if data.len() != self.cluster_size as usize {
            return Err(FatxError::InvalidClusterSize(data.len()));
        }
        let address = self.cluster_address(id)?;
        self.disk.write_all_at(address, data)?;
        Ok(())
    }

    /// Rewrites the on-disk chain table: live entries followed by zero
    /// padding up to the table size.
    pub fn flush_chain_map(&mut self) -> Result<(), FatxError> {
        let table = self.chain.to_bytes(ChainMap::table_size(self.cluster_count));
        self.disk
            .write_all_at(self.start + SUPERBLOCK_SIZE as u64, &table)?;
        Ok(())
    }
}
