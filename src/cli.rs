//! Small helpers shared by the command-line binaries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

/// Loads `.env.local` then `.env` and installs the log subscriber. `RUST_LOG` overrides `info`.
pub fn init() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

// Flags that may take their value as the next argument.
const VALUE_FLAGS: [&str; 5] = ["--db", "--trials", "--seed", "--min-edge", "--bins"];

/// First positional argument, or `fallback`.
pub fn input_path(fallback: &str) -> PathBuf {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    args.iter()
        .enumerate()
        .find(|(idx, a)| {
            !a.starts_with("--")
                && !(*idx > 0 && VALUE_FLAGS.contains(&args[idx - 1].as_str()))
        })
        .map(|(_, a)| PathBuf::from(a))
        .unwrap_or_else(|| PathBuf::from(fallback))
}

/// Value of `--name=value` or `--name value`.
pub fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn parse_arg<T: std::str::FromStr>(name: &str) -> Option<T> {
    arg_value(name).and_then(|v| v.parse::<T>().ok())
}

pub fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}

pub fn db_path_arg() -> Option<PathBuf> {
    arg_value("--db").filter(|v| !v.is_empty()).map(PathBuf::from)
}
