use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use saga_core::config::SagaConfig;
use saga_store::SagaPaths;
use serde_json::{Map, Value};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Dotted key (e.g. agent.max_diff_fetches)
        key: String,
        /// Config value (true/false/number/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Dotted key
        key: String,
    },
    /// List all values set in config.json
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, cwd: &Path) -> anyhow::Result<()> {
    let root = SagaPaths::find_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    let path = SagaPaths::discover(&root).config_json;
    match cmd {
        ConfigCmd::Set { key, value } => set(&path, &key, &value),
        ConfigCmd::Get { key } => get(&path, &key),
        ConfigCmd::List => list(&path),
    }
}

// ── Command Implementations ──

/// `saga config set <key> <value>`
fn set(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = read_config(path)?;
    set_dotted(&mut config, key, parse_value(value))?;
    serde_json::from_value::<SagaConfig>(Value::Object(config.clone()))
        .with_context(|| format!("invalid value for {key}: {value}"))?;
    write_config(path, &config)?;
    println!("{key} = {value}");
    Ok(())
}

/// `saga config get <key>`
fn get(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = read_config(path)?;
    match get_dotted(&config, key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `saga config list`
fn list(path: &Path) -> anyhow::Result<()> {
    let config = read_config(path)?;
    let entries = flatten(&config);
    if entries.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in entries {
            println!("{k} = {v}");
        }
    }
    Ok(())
}

// ── Helpers ──

/// Read `.saga/config.json`. Returns an empty map if the file doesn't exist.
fn read_config(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    let val: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match val {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Write through a temp file in the same directory, then rename over.
fn write_config(path: &Path, config: &Map<String, Value>) -> anyhow::Result<()> {
    let parent: PathBuf = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    std::fs::create_dir_all(&parent)?;
    let json = serde_json::to_string_pretty(config)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Parse a string value into an appropriate JSON value (bool/number/string).
fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                Value::String(s.to_string())
            }
        }
    }
}

fn get_dotted<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut cur = config.get(parts.next()?)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

fn set_dotted(config: &mut Map<String, Value>, key: &str, value: Value) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("invalid config key {key:?}");
    }
    let (last, sections) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("invalid config key {key:?}"))?;
    let mut cur = config;
    for section in sections {
        let slot = cur
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cur = match slot {
            Value::Object(map) => map,
            _ => anyhow::bail!("{section} is not a section"),
        };
    }
    cur.insert(last.to_string(), value);
    Ok(())
}

fn flatten(config: &Map<String, Value>) -> Vec<(String, Value)> {
    fn walk(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
        for (k, v) in map {
            let key = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            match v {
                Value::Object(inner) => walk(&key, inner, out),
                other => out.push((key, other.clone())),
            }
        }
    }
    let mut out = Vec::new();
    walk("", config, &mut out);
    out
}
