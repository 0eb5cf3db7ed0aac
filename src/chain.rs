use crate::error::ChainError;

/// Cluster id of the root directory. Cluster ids are 1-based; chain map
/// entry 0 is reserved.
pub const ROOT_CLUSTER: u32 = 1;

/// The chain table is stored in whole 4096-byte blocks.
pub const CHAIN_TABLE_BLOCK: u64 = 4096;

/// Cluster-count threshold at which chain entries grow from 16 to 32 bits.
pub const WIDE_CHAIN_THRESHOLD: u32 = 0xfff4;

/// In-memory cluster chain map of one volume.
///
/// The on-disk table is an array of 16-bit or 32-bit words depending on
/// the cluster count; the width is resolved once at open/create time and
/// everything else goes through width-agnostic accessors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainMap {
    Word(Vec<u16>),
    Dword(Vec<u32>),
}

impl ChainMap {
    /// Chain entry width in bytes for a volume with `cluster_count` clusters.
    pub fn entry_width(cluster_count: u32) -> u32 {
        if cluster_count >= WIDE_CHAIN_THRESHOLD { 4 } else { 2 }
    }

    /// Size of the on-disk chain table: one entry per cluster, rounded up
    /// to the next whole block.
    pub fn table_size(cluster_count: u32) -> u64 {
        let raw = cluster_count as u64 * Self::entry_width(cluster_count) as u64;
        raw.next_multiple_of(CHAIN_TABLE_BLOCK)
    }

    /// Builds the minimal two-entry map of a fresh volume: the reserved
    /// root marker, then the end-of-chain entry for the root directory
    /// cluster.
    pub fn new_empty(cluster_count: u32) -> ChainMap {
        if Self::entry_width(cluster_count) == 2 {
            ChainMap::Word(vec![ROOT_MARKER_16, EOC_MARKER_16])
        } else {
            ChainMap::Dword(vec![ROOT_MARKER_32, EOC_MARKER_32])
        }
    }

    /// Decodes a chain table read from disk. `bytes` must hold the full
    /// rounded table; surplus padding entries are kept so lookups past
    /// `cluster_count` stay in bounds.
    pub fn from_bytes(cluster_count: u32, bytes: &[u8]) -> ChainMap {
        if Self::entry_width(cluster_count) == 2 {
            ChainMap::Word(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes(c.try_into().unwrap()))
                    .collect(),
            )
        } else {
            ChainMap::Dword(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                    .collect(),
            )
        }
    }

    /// Encodes the live entries followed by zero padding up to `table_size`.
    pub fn to_bytes(&self, table_size: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(table_size as usize);
        match self {
            ChainMap::Word(entries) => {
                for e in entries {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
            ChainMap::Dword(entries) => {
                for e in entries {
                    out.extend_from_slice(&e.to_le_bytes());
                }
            }
        }
        out.resize(table_size as usize, 0);
        out
    }

    pub fn len(&self) -> usize {
        match self {
            ChainMap::Word(entries) => entries.len(),
            ChainMap::Dword(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: u32) -> Option<u32> {
        match self {
            ChainMap::Word(entries) => entries.get(index as usize).map(|&e| e as u32),
            ChainMap::Dword(entries) => entries.get(index as usize).copied(),
        }
    }

    /// Stores a chain entry, growing the live region as needed. Values
    /// are truncated to the resolved entry width.
    pub fn set(&mut self, index: u32, value: u32) {
        let index = index as usize;
        match self {
            ChainMap::Word(entries) => {
                if index >= entries.len() {
                    entries.resize(index + 1, 0);
                }
                entries[index] = value as u16;
            }
            ChainMap::Dword(entries) => {
                if index >= entries.len() {
                    entries.resize(index + 1, 0);
                }
                entries[index] = value;
            }
        }
    }

    /// Marker meaning "no successor" at this map's entry width.
    pub fn eoc_marker(&self) -> u32 {
        match self {
            ChainMap::Word(_) => EOC_MARKER_16 as u32,
            ChainMap::Dword(_) => EOC_MARKER_32,
        }
    }

    /// Marker found at the head entry of a freshly rooted chain.
    pub fn root_marker(&self) -> u32 {
        match self {
            ChainMap::Word(_) => ROOT_MARKER_16 as u32,
            ChainMap::Dword(_) => ROOT_MARKER_32,
        }
    }

    /// Largest cluster id a stored entry may legally reference.
    pub fn max_cluster(&self) -> u32 {
        match self {
            ChainMap::Word(_) => MAX_CLUSTER_16 as u32,
            ChainMap::Dword(_) => MAX_CLUSTER_32,
        }
    }

    /// Returns the successor of cluster `id`, or `None` at the end of the
    /// chain. Ids below 1 are a caller bug surfaced as `InvalidCluster`;
    /// a zero entry is a gap in the chain and an over-large entry is
    /// corruption, both unrecoverable for the current traversal.
    pub fn next(&self, id: u32) -> Result<Option<u32>, ChainError> {
        if id < ROOT_CLUSTER {
            return Err(ChainError::InvalidCluster(id));
        }
        let entry = self.get(id).ok_or(ChainError::InvalidCluster(id))?;

        if entry == self.eoc_marker() || entry == self.root_marker() {
            return Ok(None);
        }
        if entry == 0 {
            return Err(ChainError::Unallocated(id));
        }
        if entry > self.max_cluster() {
            return Err(ChainError::OutOfRange { id, next: entry });
        }
        Ok(Some(entry))
    }
}

const ROOT_MARKER_16: u16 = 0xfff8;
const EOC_MARKER_16: u16 = 0xffff;
const MAX_CLUSTER_16: u16 = 0xfff4;

const ROOT_MARKER_32: u32 = 0xfffffff8;
const EOC_MARKER_32: u32 = 0xffffffff;
const MAX_CLUSTER_32: u32 = 0xfffffff4;
