use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bl60x_core::session::{AssetSpec, DigestPolicy, FlashSession, NamedImage, SessionConfig};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "BL60x serial flasher (Pure Rust)", long_about = None)]
struct Args {
    /// Serial port (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate: 9600, 19200, 38400, 57600, 115200 or 230400
    #[arg(short, long)]
    baud: Option<u32>,

    /// Path to the eflash loader image
    #[arg(long)]
    loader: Option<PathBuf>,

    /// Program PATH at ADDR, e.g. 0x10000=firmware.bin (repeatable)
    #[arg(long = "asset", value_name = "ADDR=PATH", value_parser = parse_asset)]
    assets: Vec<AssetSpec>,

    /// Partition table, flashed to both table slots
    #[arg(long)]
    partition_table: Option<PathBuf>,

    /// Program PATH at the partition entry NAME, e.g. FW=firmware.bin (repeatable)
    #[arg(long = "image", value_name = "NAME=PATH", value_parser = parse_image)]
    images: Vec<NamedImage>,

    /// Abort when the device reports a digest different from the file's
    #[arg(long)]
    strict_digest: bool,

    /// Load session settings from a TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective settings to a TOML file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.is_empty() => Ok((k, v)),
        _ => Err(format!("expected KEY=PATH, got '{}'", s)),
    }
}

fn parse_asset(s: &str) -> Result<AssetSpec, String> {
    let (addr, path) = split_pair(s)?;
    Ok(AssetSpec {
        address: parse_address(addr)?,
        path: PathBuf::from(path),
    })
}

fn parse_image(s: &str) -> Result<NamedImage, String> {
    let (name, path) = split_pair(s)?;
    Ok(NamedImage {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

/// Start from the config file (if any) and let flags override it.
fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(loader) = &args.loader {
        config.loader_path = Some(loader.clone());
    }
    if let Some(pt) = &args.partition_table {
        config.partition_table = Some(pt.clone());
    }
    config.assets.extend(args.assets.iter().cloned());
    config.images.extend(args.images.iter().cloned());
    if args.strict_digest {
        config.digest_policy = DigestPolicy::Strict;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = build_config(args)?;

    if let Some(path) = &args.save_config {
        config
            .save_to_file(path)
            .with_context(|| format!("saving config {}", path.display()))?;
        info!(path = %path.display(), "Saved configuration");
    }

    if config.port.is_empty() {
        if args.save_config.is_some() {
            return Ok(());
        }
        bail!("no serial port given (use --port or a config file)");
    }

    let session = FlashSession::new(config);
    let report = session.run()?;

    for outcome in &report.outcomes {
        if outcome.verified() {
            info!(address = %format!("0x{:08X}", outcome.address), len = outcome.len, "Verified");
        } else {
            warn!(
                address = %format!("0x{:08X}", outcome.address),
                expected = %outcome.expected,
                actual = %outcome.actual,
                "Digest mismatch"
            );
        }
    }
    info!(
        assets = report.outcomes.len(),
        finished = report.finished,
        "Flashing finished"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting bl60x-flash...");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x10000"), Ok(0x10000));
        assert_eq!(parse_address("0XE000"), Ok(0xE000));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("-1").is_err());
    }

    #[test]
    fn test_parse_asset_and_image() {
        let asset = parse_asset("0x2000=boot2.bin").unwrap();
        assert_eq!(asset.address, 0x2000);
        assert_eq!(asset.path, PathBuf::from("boot2.bin"));

        let image = parse_image("FW=build/fw.bin").unwrap();
        assert_eq!(image.name, "FW");
        assert_eq!(image.path, PathBuf::from("build/fw.bin"));

        assert!(parse_asset("boot2.bin").is_err());
        assert!(parse_image("=fw.bin").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "bl60x-flash",
            "--port",
            "/dev/ttyUSB1",
            "--baud",
            "230400",
            "--loader",
            "eflash_loader_40m.bin",
            "--asset",
            "0x0=boot2.bin",
            "--asset",
            "0x10000=fw.bin",
            "--strict-digest",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.baud_rate, 230_400);
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.assets[1].address, 0x10000);
        assert_eq!(config.digest_policy, DigestPolicy::Strict);
        assert!(config.decode_security_flags);
    }
}
