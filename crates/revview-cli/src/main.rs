//! revview - offline inspection of repository view cache files.
//!
//! Reads a cache store directly without contacting the remote repository, so it
//! is safe to run while a host process has the same file open.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use revview_core::path::normalize_path;
use revview_core::{NodeStore, SqliteStore, StoreConfig};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "revview")]
#[command(about = "Inspect revview cache files")]
struct Args {
    /// Cache store to open (e.g. ~/.cache/revview/caches/repo-<uuid>.db)
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// Namespace to operate on
    #[arg(short, long, global = true, default_value = StoreConfig::ANONYMOUS_NAMESPACE)]
    namespace: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Entry counts and sizes per namespace
    Stats,
    /// List cached paths in the namespace
    List,
    /// Print the cached entry for a path as JSON
    Show { path: String },
    /// Remove every entry in the namespace
    Purge,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = run(&args)?;
    print!("{}", output);
    Ok(())
}

fn run(args: &Args) -> Result<String> {
    let Some(cache_file) = &args.cache_file else {
        bail!("--cache-file is required");
    };
    if !cache_file.exists() {
        bail!("cache file not found: {}", cache_file.display());
    }

    debug!("Opening cache file {}", cache_file.display());
    let store = SqliteStore::open(cache_file)
        .with_context(|| format!("failed to open {}", cache_file.display()))?;

    let output = execute(&store, &args.namespace, &args.command);
    store.close()?;
    output
}

fn execute(store: &SqliteStore, namespace: &str, command: &Command) -> Result<String> {
    match command {
        Command::Stats => {
            let stats = store.stats()?;
            Ok(format!("{}\n", serde_json::to_string_pretty(&stats)?))
        }
        Command::List => {
            let mut out = String::new();
            for (path, entry) in store.entries(namespace)? {
                let children = entry
                    .children()
                    .map(|c| c.len().to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    out,
                    "{:<8} {:<7} {:>5}  {}",
                    entry.revision().to_string(),
                    entry.kind().as_str(),
                    children,
                    path
                )?;
            }
            Ok(out)
        }
        Command::Show { path } => {
            let path = normalize_path(path);
            match store.get(namespace, &path)? {
                Some(entry) => Ok(format!("{}\n", serde_json::to_string_pretty(&entry)?)),
                None => bail!("{} is not cached in namespace '{}'", path, namespace),
            }
        }
        Command::Purge => {
            let removed = store.clear_namespace(namespace)?;
            store.commit()?;
            info!("Purged namespace '{}'", namespace);
            Ok(format!("removed {} entries from '{}'\n", removed, namespace))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revview_core::{ChildEntry, DirListing, NodeEntry, NodeKind, Revision};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn at(secs: u64) -> chrono::DateTime<chrono::Utc> {
        (UNIX_EPOCH + Duration::from_secs(secs)).into()
    }

    fn create_test_cache() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repo-abc123.db");
        let store = SqliteStore::open(&path).unwrap();

        let listing = DirListing {
            revision: 7,
            children: vec![
                ChildEntry::new(5, at(5), NodeKind::File, "a.txt"),
                ChildEntry::new(7, at(7), NodeKind::Directory, "b"),
            ],
        };
        store
            .put("data", "/trunk/lib", &NodeEntry::directory(listing))
            .unwrap();
        store
            .put(
                "data",
                "/trunk/README",
                &NodeEntry::without_children(Revision::Latest, NodeKind::File),
            )
            .unwrap();
        store
            .put(
                "data-alice",
                "/trunk",
                &NodeEntry::without_children(Revision::Number(3), NodeKind::Directory),
            )
            .unwrap();
        store.close().unwrap();

        (temp_dir, path)
    }

    fn args_for(path: &PathBuf, namespace: &str, command: Command) -> Args {
        Args {
            cache_file: Some(path.clone()),
            namespace: namespace.to_string(),
            debug: false,
            command,
        }
    }

    #[test]
    fn test_cli_parses() {
        let args = Args::try_parse_from([
            "revview",
            "show",
            "/trunk/lib",
            "--cache-file",
            "x.db",
            "-n",
            "data-bob",
        ])
        .unwrap();
        assert_eq!(args.namespace, "data-bob");
        assert!(matches!(args.command, Command::Show { ref path } if path == "/trunk/lib"));

        let args = Args::try_parse_from(["revview", "list"]).unwrap();
        assert_eq!(args.namespace, "data");
        assert!(args.cache_file.is_none());
    }

    #[test]
    fn test_list() {
        let (_dir, path) = create_test_cache();
        let out = run(&args_for(&path, "data", Command::List)).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("HEAD"));
        assert!(lines[0].ends_with("/trunk/README"));
        assert!(lines[1].starts_with("r7"));
        assert!(lines[1].contains("dir"));
        assert!(lines[1].ends_with("/trunk/lib"));
    }

    #[test]
    fn test_show_normalizes_path() {
        let (_dir, path) = create_test_cache();
        let out = run(&args_for(
            &path,
            "data",
            Command::Show {
                path: "trunk/lib/".to_string(),
            },
        ))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["revision"], 7);
        assert_eq!(value["children"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_show_missing_path() {
        let (_dir, path) = create_test_cache();
        let result = run(&args_for(
            &path,
            "data-alice",
            Command::Show {
                path: "/trunk/lib".to_string(),
            },
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_stats() {
        let (_dir, path) = create_test_cache();
        let out = run(&args_for(&path, "data", Command::Stats)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["total_entries"], 3);
        assert_eq!(value["namespaces"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_purge_leaves_other_namespaces() {
        let (_dir, path) = create_test_cache();
        let out = run(&args_for(&path, "data", Command::Purge)).unwrap();
        assert!(out.starts_with("removed 2 entries"));

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.entries("data").unwrap().is_empty());
        assert_eq!(store.entries("data-alice").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_cache_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.db");
        assert!(run(&args_for(&path, "data", Command::List)).is_err());
        assert!(!path.exists());

        let args = Args {
            cache_file: None,
            ..args_for(&path, "data", Command::List)
        };
        assert!(run(&args).is_err());
    }
}
