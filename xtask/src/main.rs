use anyhow::{Context, Result};
use bl60x_core::image::{BootHeader, LoaderImage, LoaderLayout, PartitionTable};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run all tests
    Test,
    /// Run the CLI, forwarding any extra arguments
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Dump a loader image or partition table
    Inspect {
        /// Treat the file as a partition table instead of a loader image
        #[arg(long)]
        partition: bool,
        path: PathBuf,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn inspect_loader(path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image = LoaderImage::from_bytes(data, LoaderLayout::V1)?;
    let bh = BootHeader::from_bytes(image.boot_header_bytes())?;
    println!("boot header");
    println!("  revision      {}", bh.revision);
    println!("  boot cfg      0x{:08X}", bh.boot_cfg.0);
    println!("    sign        {}", bh.boot_cfg.sign());
    println!("    encrypt     {}", bh.boot_cfg.encrypt_type());
    println!("    key sel     {}", bh.boot_cfg.key_sel());
    println!("    no segment  {}", bh.boot_cfg.no_segment());
    println!("    crc ignore  {}", bh.boot_cfg.crc_ignore());
    println!("    hash ignore {}", bh.boot_cfg.hash_ignore());
    println!("  segment info  {}", bh.segment_info);
    println!("  boot entry    0x{:08X}", bh.boot_entry);
    println!("  image start   0x{:08X}", bh.img_start);
    println!("  crc32         0x{:08X} ({})", bh.crc32, if bh.is_crc_valid() { "ok" } else { "BAD" });
    for problem in bh.problems() {
        println!("  ! {}", problem);
    }

    let seg = image.segment_header()?;
    println!("segment header");
    println!("  dest          0x{:08X}", seg.dest_addr);
    println!("  len           {}", seg.len);
    println!("  crc32         0x{:08X} ({})", seg.crc32, if seg.is_crc_valid() { "ok" } else { "BAD" });
    println!("segment data    {} bytes", image.segment_data().len());
    Ok(())
}

fn inspect_partition(path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let table = PartitionTable::from_bytes(&data)?;
    println!(
        "partition table v{} entries={} age={} crc={}",
        table.version,
        table.entry_cnt,
        table.age,
        if table.is_crc_valid() { "ok" } else { "BAD" }
    );
    for e in table.active_entries() {
        println!(
            "  {:<9} type={:<2} active={} addr=[0x{:08X}, 0x{:08X}] max=[0x{:X}, 0x{:X}]",
            e.name, e.entry_type, e.active_index, e.address[0], e.address[1], e.max_len[0], e.max_len[1]
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build", "--workspace"], "Build")?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"], "Tests")?;
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let mut full = vec!["run", "-p", "bl60x-cli", "--"];
            full.extend(args.iter().map(String::as_str));
            cargo(&full, "Run")?;
        }
        Commands::Inspect { partition, path } => {
            if *partition {
                inspect_partition(path)?;
            } else {
                inspect_loader(path)?;
            }
        }
    }

    Ok(())
}
