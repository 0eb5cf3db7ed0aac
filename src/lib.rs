//! # FATX
//!
//! FATX filesystem driver and Xbox partition table tools in Rust.
//!
//! The crate opens, creates, lists and extracts from FATX volumes (the
//! on-disk format of the original Xbox hard drive) and computes the
//! console's fixed 14-slot partition table under several capacity
//! allocation policies.
//!
//! ## Usage
//!
//! ```rust
//! use std::io::Cursor;
//! use fatx_fs::{MB, Volume, format::FormatVolumeOptionsBuilder};
//!
//! let size = 64 * MB as u64;
//! let options = FormatVolumeOptionsBuilder::default()
//!     .offset(0)
//!     .size(size)
//!     .build()
//!     .unwrap();
//!
//! let disk = Cursor::new(Vec::new());
//! let mut volume = Volume::create(disk, options).unwrap();
//!
//! let mut listing = Vec::new();
//! volume.dump_tree(&mut listing).unwrap();
//! assert!(listing.is_empty()); // fresh root directory
//! ```
//!
//! ## Limitations
//! The driver extracts files and creates whole partitions; it does not
//! write or modify individual files, and a volume must not be accessed
//! concurrently while it is being created.

/// Chain-map store for cluster successor lookups
pub mod chain;
/// Directory entry codec
pub mod dirent;
/// Disk I/O traits and utility functions
pub mod disk;
pub mod error;
/// Volume creation options and cluster-size tiers
pub mod format;
/// Xbox partition table layout engine
pub mod layout;
/// FATX volume header
pub mod superblock;
/// DOS date/time stamps
pub mod timestamp;
/// Partition driver
pub mod volume;
mod walk;

pub use volume::Volume;

pub const GB: u32 = 1024 * 1024 * 1024;
pub const MB: u32 = 1024 * 1024;
pub const KB: u16 = 1024;

/// Sector size of the Xbox hard drive.
pub const SECTOR_SIZE: u64 = 512;
