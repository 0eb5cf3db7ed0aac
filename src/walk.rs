//! Recursive traversal of directory cluster chains: listing, path
//! resolution and file extraction.

use std::io::Write;

use log::debug;

use crate::chain::ROOT_CLUSTER;
use crate::dirent::{DirCursor, DirEntry, DirSlot, NAME_MAX};
use crate::disk::ReadOffset;
use crate::error::{FatxError, PathError};
use crate::volume::Volume;

/// Hard bound on directory nesting; malformed chains can be cyclic.
pub(crate) const MAX_NESTING: usize = 64;

impl<D: ReadOffset> Volume<D> {
    /// Writes the whole directory tree to `out`, one line per entry,
    /// indented by nesting depth.
    pub fn dump_tree<W: Write>(&mut self, out: &mut W) -> Result<(), FatxError> {
        self.dump_tree_from(ROOT_CLUSTER, 0, out)
    }

    fn dump_tree_from<W: Write>(
        &mut self,
        cluster_id: u32,
        nesting: usize,
        out: &mut W,
    ) -> Result<(), FatxError> {
        if nesting >= MAX_NESTING {
            return Err(PathError::TooDeep.into());
        }

        let mut cluster = Some(cluster_id);
        'chain: while let Some(id) = cluster {
            let data = self.read_cluster(id)?;
            let mut cursor = DirCursor::new(&data);
            while let Some(slot) = cursor.next_slot() {
                match slot {
                    // the sentinel ends the directory, not just this cluster
                    DirSlot::End => break 'chain,
                    DirSlot::Deleted => continue,
                    DirSlot::Entry(entry) => {
                        writeln!(
                            out,
                            "{:indent$}/{}  [{}] (SZ:{} CL:{:x})",
                            "",
                            entry.name,
                            entry.flags_string(),
                            entry.display_size(),
                            entry.first_cluster,
                            indent = nesting
                        )?;
                        if entry.is_directory() {
                            self.dump_tree_from(entry.first_cluster, nesting + 1, out)?;
                        }
                    }
                }
            }
            cluster = self.next_cluster(id)?;
        }
        Ok(())
    }

    /// Resolves a `/`-separated path from the root directory. Backslashes
    /// are accepted as separators; leading separators are ignored. The
    /// terminal entry may be a file or a directory.
    pub fn resolve_path(&mut self, path: &str) -> Result<DirEntry, FatxError> {
        let normalized = path.replace('\\', "/");
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let Some((&terminal, parents)) = segments.split_last() else {
            return Err(PathError::NotFound(path.to_string()).into());
        };

        let mut cluster = ROOT_CLUSTER;
        for &segment in parents {
            let entry = self.lookup(cluster, segment)?;
            if !entry.is_directory() {
                return Err(PathError::NotADirectory(segment.to_string()).into());
            }
            cluster = entry.first_cluster;
        }
        self.lookup(cluster, terminal)
    }

    /// Resolves `path` to a plain file and copies exactly its size to
    /// `out`, following the cluster chain.
    pub fn dump_file<W: Write>(&mut self, path: &str, out: &mut W) -> Result<(), FatxError> {
        debug!("extracting {path}");
        let entry = self.resolve_path(path)?;
        if entry.is_directory() {
            return Err(PathError::IsADirectory(entry.name).into());
        }
        self.extract_file(entry.first_cluster, entry.file_size, out)
    }

    /// Copies `file_size` bytes starting at `first_cluster` to `out`,
    /// cluster by cluster. Fails with `TruncatedChain` if the chain ends
    /// first.
    pub fn extract_file<W: Write>(
        &mut self,
        first_cluster: u32,
        file_size: u32,
        out: &mut W,
    ) -> Result<(), FatxError> {
        let mut remaining = file_size as u64;
        if remaining == 0 {
            return Ok(());
        }

        let mut cluster = Some(first_cluster);
        while let Some(id) = cluster {
            let data = self.read_cluster(id)?;
            let take = remaining.min(self.cluster_size() as u64) as usize;
            out.write_all(&data[..take])?;
            remaining -= take as u64;
            if remaining == 0 {
                break;
            }
            cluster = self.next_cluster(id)?;
        }

        if remaining > 0 {
            return Err(FatxError::TruncatedChain(remaining));
        }
        Ok(())
    }

    /// Scans one directory chain for a name, case-insensitively.
    fn lookup(&mut self, cluster_id: u32, needle: &str) -> Result<DirEntry, FatxError> {
        if needle.len() > NAME_MAX {
            return Err(PathError::SegmentTooLong(needle.len()).into());
        }

        let mut cluster = Some(cluster_id);
        'chain: while let Some(id) = cluster {
            let data = self.read_cluster(id)?;
            let mut cursor = DirCursor::new(&data);
            while let Some(slot) = cursor.next_slot() {
                match slot {
                    DirSlot::End => break 'chain,
                    DirSlot::Deleted => continue,
                    DirSlot::Entry(entry) => {
                        if entry.name_matches(needle) {
                            return Ok(entry);
                        }
                    }
                }
            }
            cluster = self.next_cluster(id)?;
        }
        Err(PathError::NotFound(needle.to_string()).into())
    }
}
