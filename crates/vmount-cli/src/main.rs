//! vmount inspection tool.
//!
//! Mounts local directories into an in-process resource-mounting service
//! and drives the filesystem protocol surface against it (the same calls
//! an OS driver bridge would make) so a mount layout can be checked
//! without a kernel driver.
//!
//! Usage:
//!   vmount --mount Media=/srv/media ls '\Media'
//!   vmount --mount Media=/srv/media stat '\Media\movie.ts'
//!   vmount --mount Media=/srv/media cat '\Media\movie.ts' > movie.ts
//!   vmount --config drive.toml --mount Media=/srv/media tree

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vmount_kernel::{
    CreationDisposition, FileInformation, FilesystemHandler, InProcessBridge, LocalResource,
    MountConfig, MountError, OpenAccess, ResourceMountingService, ShareAccess,
};

/// Inspect a virtual resource mount without an OS driver.
#[derive(Parser, Debug)]
#[command(name = "vmount")]
#[command(about = "Inspect a virtual resource mount without an OS driver")]
struct Args {
    /// TOML file with the drive letter and volume label
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mount a local path as ROOT=PATH (repeatable)
    #[arg(long = "mount", value_name = "ROOT=PATH")]
    mounts: Vec<String>,

    /// Print machine-readable JSON instead of columns
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a virtual directory
    Ls {
        /// Virtual path, e.g. '\Media'
        #[arg(default_value = "\\")]
        path: String,
    },
    /// Print file information for a virtual path
    Stat {
        /// Virtual path, e.g. '\Media\movie.ts'
        path: String,
    },
    /// Write a virtual file's bytes to stdout
    Cat {
        /// Virtual path, e.g. '\Media\movie.ts'
        path: String,
    },
    /// Print the whole mounted tree
    Tree,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str::<MountConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MountConfig::default(),
    };

    let service = Arc::new(ResourceMountingService::new(config));
    let bridge = Arc::new(InProcessBridge::new());
    service.clone().startup(bridge).await;

    let result = run(&args, &service).await;
    service.shutdown().await;
    result
}

async fn run(args: &Args, service: &Arc<ResourceMountingService>) -> Result<()> {
    if args.mounts.is_empty() {
        bail!("nothing mounted; pass at least one --mount ROOT=PATH");
    }
    for spec in &args.mounts {
        let (root, path) = spec
            .split_once('=')
            .with_context(|| format!("bad --mount spec {spec:?}, expected ROOT=PATH"))?;
        match service.create_root_directory(root).await {
            Ok(_) | Err(MountError::DuplicateRootName(_)) => {}
            Err(err) => return Err(err.into()),
        }
        let resource = LocalResource::new(path)
            .with_context(|| format!("mounting {path} under {root}"))?;
        let mounted = service.add_resource(root, Arc::new(resource)).await?;
        tracing::info!(%mounted, "mounted");
    }

    match &args.command {
        Command::Ls { path } => ls(service, path, args.json).await,
        Command::Stat { path } => stat(service, path, args.json).await,
        Command::Cat { path } => cat(service, path).await,
        Command::Tree => tree(service).await,
    }
}

async fn ls(service: &Arc<ResourceMountingService>, path: &str, json: bool) -> Result<()> {
    let handle = service.open_directory(path).await?;
    let entries = service.find_files(handle).await?;
    service.close(handle).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}

async fn stat(service: &Arc<ResourceMountingService>, path: &str, json: bool) -> Result<()> {
    let opened = service
        .open(
            path,
            OpenAccess::read(),
            ShareAccess::default(),
            CreationDisposition::Open,
        )
        .await?;
    let info = service.file_information(opened.handle).await?;
    service.close(opened.handle).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", format_entry(&info));
    }
    Ok(())
}

async fn cat(service: &Arc<ResourceMountingService>, path: &str) -> Result<()> {
    let opened = service
        .open(
            path,
            OpenAccess::read(),
            ShareAccess::default(),
            CreationDisposition::Open,
        )
        .await?;
    if opened.is_directory {
        service.close(opened.handle).await?;
        bail!("{path} is a directory");
    }

    let mut stdout = std::io::stdout().lock();
    let mut buf = vec![0u8; 64 * 1024];
    let mut offset = 0u64;
    loop {
        let n = service.read(opened.handle, offset, &mut buf).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
        offset += n as u64;
    }
    service.cleanup(opened.handle).await?;
    service.close(opened.handle).await?;
    Ok(())
}

async fn tree(service: &Arc<ResourceMountingService>) -> Result<()> {
    println!("{}", service.mount_point());
    // Depth-first walk over the protocol surface itself.
    let mut stack: Vec<(String, usize, Option<FileInformation>)> = vec![("\\".to_string(), 0, None)];
    while let Some((path, depth, info)) = stack.pop() {
        let is_dir = info.as_ref().map(|entry| entry.is_dir()).unwrap_or(true);
        if let Some(entry) = &info {
            println!("{}{}", "  ".repeat(depth), format_entry(entry));
        }
        if !is_dir {
            continue;
        }

        let handle = service.open_directory(&path).await?;
        let entries = service.find_files(handle).await?;
        service.close(handle).await?;

        for entry in entries.into_iter().rev() {
            let child = if path == "\\" {
                format!("\\{}", entry.name)
            } else {
                format!("{}\\{}", path, entry.name)
            };
            stack.push((child, depth + 1, Some(entry)));
        }
    }
    Ok(())
}

fn format_entry(entry: &FileInformation) -> String {
    let kind = if entry.is_dir() { 'd' } else { '-' };
    format!("{} {:>12} {}", kind, entry.size, entry.name)
}
