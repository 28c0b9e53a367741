use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use fat32_drive::{Fat32Volume, ImageDisk, MountOptions};

const USAGE: &str = "usage: fat32-drive <image> <command> [args]

commands:
  ls                 list files in the root directory
  cat <name>         write a file to stdout
  put <src> [name]   copy a host file onto the volume
  rm <name>          delete a file
  stat               show capacity and free space
  recount            rescan the FAT and rewrite the free-cluster count

RUST_LOG controls log output (e.g. RUST_LOG=debug).";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args[0], &args[1], &args[2..]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fat32-drive: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(image: &str, command: &str, rest: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let disk = ImageDisk::open(image)?;
    let mut volume = Fat32Volume::mount_with(disk, MountOptions::default())?;

    match (command, rest) {
        ("ls", []) => list(&mut volume)?,
        ("cat", [name]) => {
            let mut reader = volume.open_for_read(name)?;
            let mut stdout = io::stdout().lock();
            while let Some(block) = reader.read_block()? {
                stdout.write_all(block.data)?;
            }
            stdout.flush()?;
        }
        ("put", [src]) => put(&mut volume, src, file_name_of(src))?,
        ("put", [src, name]) => put(&mut volume, src, name)?,
        ("rm", [name]) => {
            volume.delete(name)?;
            println!("Deleted '{}'", name);
        }
        ("stat", []) => stat(&mut volume)?,
        ("recount", []) => {
            let free = volume.recount_free_clusters()?;
            println!("{} free clusters", free);
        }
        _ => {
            eprintln!("{}", USAGE);
            return Err(format!("unknown command or arguments: {}", command).into());
        }
    }
    Ok(())
}

fn list(volume: &mut Fat32Volume<ImageDisk<fs::File>>) -> fat32_drive::Result<()> {
    let files = volume.list_directory()?;
    if files.is_empty() {
        println!("(empty)");
    }
    for file in &files {
        println!(
            "{:>10}  {:<12}  {}",
            file.size,
            file.short_display_name(),
            file.name
        );
    }
    if let Some(free) = volume.statistics()?.free_bytes {
        println!("{} bytes free", free);
    }
    Ok(())
}

fn put(
    volume: &mut Fat32Volume<ImageDisk<fs::File>>,
    src: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(src)?;
    let mut writer = volume.open_for_write(name)?;
    writer.write_block(&data)?;
    let entry = writer.close()?;
    println!(
        "Wrote '{}' as {} ({} bytes)",
        entry.name,
        entry.short_display_name(),
        entry.size
    );
    Ok(())
}

fn stat(volume: &mut Fat32Volume<ImageDisk<fs::File>>) -> fat32_drive::Result<()> {
    let stats = volume.statistics()?;
    let session = *volume.session();
    println!("Partition offset:  {} sectors", session.unused_sectors);
    println!("Cluster size:      {} bytes", stats.cluster_bytes);
    println!("Clusters:          {}", stats.total_clusters);
    println!("Capacity:          {} bytes", stats.total_bytes);
    match (stats.free_clusters, stats.free_bytes) {
        (Some(clusters), Some(bytes)) => {
            println!("Free:              {} clusters ({} bytes)", clusters, bytes)
        }
        _ => println!("Free:              unknown (run `recount`)"),
    }
    if let Some(hint) = stats.next_free_hint {
        println!("Next free hint:    cluster {}", hint);
    }
    if let Some(degraded) = volume.degraded() {
        println!("Degraded:          {:?}", degraded);
    }
    Ok(())
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
