use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shotwellfs::cache::{marker, DerivedAssetCache, IdentityMarker};
use shotwellfs::config::Config;
use shotwellfs::logging::{self, LogTarget};
use shotwellfs::vfs::{self, Tree};
use shotwellfs::{Catalog, Scanner};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    options: Vec<String>,
    foreground: bool,
    list: bool,
    library: Option<PathBuf>,
    mountpoint: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("shotwellfs {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" | "-o" => {
                if i + 1 < args.len() {
                    if args[i] == "-o" {
                        parsed.options.push(args[i + 1].clone());
                    } else {
                        parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    }
                    i += 1;
                } else {
                    eprintln!("Error: {} requires an argument", args[i]);
                    std::process::exit(1);
                }
            }
            "--foreground" | "-f" => parsed.foreground = true,
            "--list" | "-l" => parsed.list = true,
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(PathBuf::from(arg)),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    parsed.library = positional.next();
    parsed.mountpoint = positional.next();
    if let Some(extra) = positional.next() {
        eprintln!("Unexpected argument: {}", extra.display());
        std::process::exit(1);
    }
    parsed
}

fn print_help() {
    println!(
        r#"shotwellfs - Shotwell library as a read-only filesystem

USAGE:
    shotwellfs [OPTIONS] [LIBRARY] [MOUNTPOINT]

OPTIONS:
    --config, -c PATH   Path to config file
    -o OPTS             rating=N,event_name=FMT,event_path=FMT,photo_path=FMT,video_path=FMT
    --foreground, -f    Log to stderr
    --list, -l          Scan once, print the tree and exit
    --version, -V       Show version
    --help, -h          Show this help message

FORMATS:
    strftime specifiers plus %{{field}} (or %<field>s / %<field>d).
    Events: id, name, comment. Photos and videos: id, title, comment, rating.

ENVIRONMENT:
    SHOTWELLFS_CONFIG   Path to config file (overrides default location)
    SHOTWELLFS_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/shotwellfs/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let target = if args.foreground || args.list {
        LogTarget::Stderr
    } else {
        LogTarget::Background
    };
    if let Err(e) = logging::init(target, None) {
        eprintln!("Warning: logging unavailable: {:#}", e);
    }

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(library) = &args.library {
        config.library = library.clone();
    }
    for options in &args.options {
        config.apply_options(options)?;
    }

    let paths = config.path_synthesizer()?;
    let preview = paths.preview();
    tracing::info!(mappings = ?preview, "Mapping paths");
    println!("Mapping paths as\n  {}", preview.join("\n  "));

    let db_path = config.db_path();
    let catalog = Catalog::open(&db_path)
        .with_context(|| format!("Failed to open Shotwell catalog {}", db_path.display()))?;
    tracing::info!(catalog = %db_path.display(), "Catalog opened");

    let cache = DerivedAssetCache::new(config.cache_dir(), cache_marker(&config));
    let mut scanner = Scanner::new(catalog, paths, Arc::new(cache), config.min_rating);
    let tree = scanner.scan().context("Initial scan failed")?;

    let Some(mountpoint) = args.mountpoint.filter(|_| !args.list) else {
        print_tree(&tree);
        return Ok(());
    };

    serve(&config, &db_path, scanner, tree, &mountpoint)
}

/// Fall back to sidecar markers when the cache filesystem rejects xattrs.
fn cache_marker(config: &Config) -> IdentityMarker {
    let preferred = IdentityMarker::from(config.cache.marker);
    if preferred == IdentityMarker::Sidecar {
        return preferred;
    }
    let dir = config.cache_dir();
    let probe_dir = if dir.is_dir() { dir.as_path() } else { config.library.as_path() };
    if marker::xattrs_supported(probe_dir) {
        preferred
    } else {
        tracing::warn!(cache = %dir.display(), "Extended attributes unsupported, using sidecar markers");
        IdentityMarker::Sidecar
    }
}

/// Mount the tree and keep it fresh until unmounted.
#[cfg(feature = "fuse")]
fn serve(config: &Config, db_path: &Path, scanner: Scanner, tree: Tree, mountpoint: &Path) -> Result<()> {
    use shotwellfs::VirtualFs;

    let vfs = Arc::new(VirtualFs::new(tree));
    let _watcher = if config.watch.enabled {
        start_rescans(config, db_path, scanner, Arc::clone(&vfs))
    } else {
        None
    };

    shotwellfs::fuse::mount(vfs, config.library.clone(), mountpoint)
        .with_context(|| format!("Failed to mount at {}", mountpoint.display()))
}

#[cfg(not(feature = "fuse"))]
fn serve(_config: &Config, _db_path: &Path, _scanner: Scanner, tree: Tree, mountpoint: &Path) -> Result<()> {
    tracing::warn!(
        mountpoint = %mountpoint.display(),
        "Built without the fuse feature, listing instead of mounting"
    );
    print_tree(&tree);
    Ok(())
}

#[cfg(feature = "fuse")]
fn start_rescans(
    config: &Config,
    db_path: &Path,
    scanner: Scanner,
    vfs: Arc<shotwellfs::VirtualFs>,
) -> Option<shotwellfs::rescan::CatalogWatcher> {
    use shotwellfs::rescan::{CatalogWatcher, Coordinator};
    use std::sync::mpsc;
    use std::time::Duration;

    let (tx, rx) = mpsc::sync_channel(config.watch.channel_capacity.max(1));
    let watcher = match CatalogWatcher::start(db_path, tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::error!(error = %e, "Catalog watch unavailable, the tree will not refresh");
            return None;
        }
    };

    let coordinator = Coordinator::new(scanner, vfs, Duration::from_millis(config.watch.settle_ms));
    let spawned = std::thread::Builder::new()
        .name("rescan".to_string())
        .spawn(move || {
            if let Err(e) = coordinator.run(rx) {
                tracing::error!(error = %e, "Rescan coordinator stopped");
            }
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "Failed to start rescan thread");
        return None;
    }
    Some(watcher)
}

fn print_tree(tree: &Tree) {
    for (path, id) in tree.walk(vfs::ROOT) {
        let Some(node) = tree.node(id) else {
            continue;
        };
        match node.backing() {
            Some(backing) => println!("{} -> {}", path, backing.display()),
            None => println!("{}/", path),
        }
    }
    println!(
        "Scan #{}: {} files in {} directories",
        tree.scan_id(),
        tree.file_count(),
        tree.directory_count().saturating_sub(1)
    );
}
