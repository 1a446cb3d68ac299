use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local};
use clap::Parser;
use erofs_reader::{FileInfo, Image};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Walk an EROFS image and print every entry.
#[derive(Debug, Parser)]
struct Opt {
    /// Path to the erofs image.
    #[clap(long)]
    img: PathBuf,

    /// Directory inside the image to start from.
    #[clap(long, default_value = "/")]
    path: String,
}

fn main() -> Result<()> {
    init_tracing();
    let opt = Opt::parse();

    let file = File::open(&opt.img)
        .with_context(|| format!("failed to open image: {}", opt.img.display()))?;
    let fs = Image::new(file).context("failed to open erofs image")?;
    info!(
        block_size = fs.block_size(),
        start = %opt.path,
        "opened image"
    );
    println!("Found valid image...");

    let walk = fs
        .walk_dir(&opt.path)
        .with_context(|| format!("failed to walk {}", opt.path))?;
    for entry in walk {
        let entry = entry.context("failed to read directory entry")?;
        let info = entry
            .dir_entry
            .info()
            .with_context(|| format!("failed to stat {}", entry.path))?;
        println!(
            "{} {:>8} {} {}",
            format_mode(&info),
            format_size(&info),
            format_time(&info),
            entry.path
        );
        let xattrs = entry
            .dir_entry
            .xattrs()
            .with_context(|| format!("failed to read xattrs of {}", entry.path))?;
        for (name, value) in &xattrs {
            println!("\t{}: {:?}", name, String::from_utf8_lossy(value));
        }
    }

    Ok(())
}

fn format_mode(info: &FileInfo) -> String {
    let mut res = String::with_capacity(10);
    res.push(if info.is_dir() { 'd' } else { '-' });

    let masks = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'), // User
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'), // Group
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'), // Other
    ];

    let mode = info.mode().bits();
    for (mask, char) in masks {
        if mode & mask != 0 {
            res.push(char);
        } else {
            res.push('-');
        }
    }

    res
}

fn format_size(info: &FileInfo) -> String {
    let size = info.size();
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KiB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1}MiB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_time(info: &FileInfo) -> String {
    let dt: DateTime<Local> = info.modified().into();
    let now = Local::now();
    if dt.year() == now.year() {
        dt.format("%b %e %H:%M").to_string()
    } else {
        dt.format("%b %e  %Y").to_string()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
