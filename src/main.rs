use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand, ValueEnum};

use fatx_fs::format::{ClusterTier, FormatVolumeOptionsBuilder};
use fatx_fs::layout::{self, AllocationPolicy, PartitionTable};
use fatx_fs::superblock::{SUPERBLOCK_SIZE, Superblock};
use fatx_fs::{MB, SECTOR_SIZE, Volume};

#[derive(Parser)]
#[command(name = "fatxdump")]
#[command(about = "FATX filesystem and Xbox partition table tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the directory tree of a FATX image
    List {
        /// FATX image file
        image: PathBuf,
    },
    /// Extract one file from a FATX image
    Dump {
        /// Path of the file inside the image
        path: String,
        /// Output filename
        output: PathBuf,
        /// FATX image file
        image: PathBuf,
    },
    /// Create a FATX image file of the given size
    Create {
        /// Image file to create
        image: PathBuf,
        /// Partition size in MB
        size_mb: u64,
    },
    /// Write a fresh FATX filesystem over an existing file or device
    Mkfs {
        /// Target file or device
        device: PathBuf,
    },
    /// Hex dump the start of one cluster of a FATX image
    Cluster {
        /// FATX image file
        image: PathBuf,
        /// Cluster id
        cluster: u32,
    },
    /// Show the Xbox partition table of a device or image
    Listpartitions {
        /// Device or image file
        device: PathBuf,
    },
    /// Partition a device and create FATX filesystems on every partition
    Prepare {
        /// Target device or image file
        device: PathBuf,
        /// How to allocate the F and G partitions
        mode: Mode,
        /// Device capacity in sectors (defaults to the file length)
        #[arg(long)]
        sectors: Option<u64>,
    },
    /// Partition a device, creating filesystems only on F and G
    Preparefg {
        /// Target device or image file
        device: PathBuf,
        /// How to allocate the F and G partitions
        mode: Mode,
        /// Device capacity in sectors (defaults to the file length)
        #[arg(long)]
        sectors: Option<u64>,
    },
    /// Partition a device, giving F a chosen share of the free space
    Customfg {
        /// Target device or image file
        device: PathBuf,
        /// Percentage of the free space given to F (0-100)
        percent: u8,
        /// Device capacity in sectors (defaults to the file length)
        #[arg(long)]
        sectors: Option<u64>,
    },
}

/// F/G allocation policies, in the order the original tool numbered them.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// F up to the 28-bit LBA limit, no G
    Capped,
    /// F takes everything, no G
    All,
    /// F capped, G takes the rest
    Rest,
    /// F and G split the free space evenly
    Even,
}

impl From<Mode> for AllocationPolicy {
    fn from(mode: Mode) -> AllocationPolicy {
        match mode {
            Mode::Capped => AllocationPolicy::Capped,
            Mode::All => AllocationPolicy::All,
            Mode::Rest => AllocationPolicy::Rest,
            Mode::Even => AllocationPolicy::Even,
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::List { image } => {
            let mut volume = open_image(&image)?;
            let stdout = io::stdout();
            volume.dump_tree(&mut stdout.lock())?;
        }
        Commands::Dump {
            path,
            output,
            image,
        } => {
            let mut volume = open_image(&image)?;
            let mut out = File::create(&output)?;
            volume.dump_file(&path, &mut out)?;
        }
        Commands::Create { image, size_mb } => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&image)?;
            let options = FormatVolumeOptionsBuilder::default()
                .offset(0)
                .size(size_mb * MB as u64)
                .zero_fill(true)
                .build()?;
            Volume::create(file, options)?;
        }
        Commands::Mkfs { device } => {
            let file = OpenOptions::new().read(true).write(true).open(&device)?;
            let size = file.metadata()?.len();
            let options = FormatVolumeOptionsBuilder::default()
                .offset(0)
                .size(size)
                .build()?;
            Volume::create(file, options)?;
        }
        Commands::Cluster { image, cluster } => {
            let mut volume = open_image(&image)?;
            let data = volume.read_cluster(cluster)?;
            hexdump(&data[..512.min(data.len())], &mut io::stdout().lock())?;
        }
        Commands::Listpartitions { device } => {
            let mut file = File::open(&device)?;
            let table = PartitionTable::read_from(&mut file)?;
            list_partitions(&table, &mut file)?;
        }
        Commands::Prepare {
            device,
            mode,
            sectors,
        } => {
            prepare(&device, mode.into(), sectors, true)?;
        }
        Commands::Preparefg {
            device,
            mode,
            sectors,
        } => {
            prepare(&device, mode.into(), sectors, false)?;
        }
        Commands::Customfg {
            device,
            percent,
            sectors,
        } => {
            prepare(&device, AllocationPolicy::Percentage(percent), sectors, false)?;
        }
    }
    Ok(())
}

fn open_image(path: &PathBuf) -> Result<Volume<File>, Box<dyn Error>> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    println!("Filename: {}, size {size}", path.display());
    Ok(Volume::open(file, 0, size)?)
}

fn prepare(
    path: &PathBuf,
    policy: AllocationPolicy,
    sectors: Option<u64>,
    include_fixed: bool,
) -> Result<(), Box<dyn Error>> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let total_sectors = match sectors {
        Some(s) => s,
        None => file.metadata()?.len() / SECTOR_SIZE,
    };
    println!("Total sectors: {total_sectors}");

    let table = layout::prepare_device(&mut file, total_sectors, policy, include_fixed)?;
    for (index, entry) in table.in_use() {
        println!(
            "partition {index}\t{}\tstart {}\tsize {}",
            entry.name(),
            entry.lba_start(),
            entry.lba_size()
        );
    }
    layout::reread_partition_table(&file);
    Ok(())
}

fn list_partitions(table: &PartitionTable, file: &mut File) -> Result<(), Box<dyn Error>> {
    use fatx_fs::disk::ReadOffset;

    println!("Partition table:");
    for (index, entry) in table.in_use() {
        print!(
            "partition {index}\tstart {}\tsize {:010}MB\t",
            entry.lba_start(),
            entry.byte_size() / MB as u64
        );

        let mut block = vec![0u8; SUPERBLOCK_SIZE];
        let tier = file
            .read_exact_at(entry.byte_start(), &mut block)
            .ok()
            .and_then(|_| Superblock::decode(&block).ok())
            .and_then(|sb| ClusterTier::from_sectors_per_cluster(sb.cluster_size() / SECTOR_SIZE as u32));

        match tier {
            Some(tier) => {
                let required = ClusterTier::for_lba_size(entry.lba_size() as u64);
                let suffix = if tier < required { "-ERR" } else { "" };
                println!("Cluster size {:02}K{suffix}", tier.cluster_size() / 1024);
            }
            None => println!("Unknown cluster size"),
        }
    }
    Ok(())
}

fn hexdump<W: Write>(data: &[u8], out: &mut W) -> io::Result<()> {
    for row in data.chunks(16) {
        for byte in row {
            write!(out, "{byte:02x} ")?;
        }
        write!(out, "    ")?;
        for &byte in row {
            let c = if (32..=126).contains(&byte) {
                byte as char
            } else {
                '.'
            };
            write!(out, "{c}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
