// ABOUTME: Settings loading for the shelly binary.
// ABOUTME: Finds a TOML file, applies environment overrides, and yields a JSON tree for the store.

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Environment variables that override `bot.*` settings
const BOT_OVERRIDES: [(&str, &str); 4] = [
    ("BOT_NAME", "name"),
    ("BOT_ID", "id"),
    ("BOT_ON_ENTER", "on_enter"),
    ("BOT_ON_EXIT", "on_exit"),
];

/// Find the settings file, checking in order:
/// 1. SHELLY_CONFIG_PATH env var (if set and the file exists)
/// 2. ./shelly.toml
fn find_settings_file() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("SHELLY_CONFIG_PATH") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "SHELLY_CONFIG_PATH points to a missing file");
    }

    let local = PathBuf::from("shelly.toml");
    if local.exists() {
        return Some(local);
    }

    None
}

/// Parse TOML text into the nested mapping the store expects
pub fn parse(content: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(content)?;
    Ok(serde_json::to_value(table)?)
}

/// Load settings from `explicit`, or from the first file found, then apply
/// environment overrides. No file at all means defaults only.
pub fn load(explicit: Option<&Path>) -> Result<Value> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_settings_file(),
    };

    let mut settings = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading settings from file");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse(&content).with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => {
            tracing::info!("No settings file found, using environment variables and defaults");
            Value::Object(Map::new())
        }
    };

    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Value) {
    let Value::Object(root) = settings else {
        return;
    };

    for (variable, key) in BOT_OVERRIDES {
        let Ok(value) = std::env::var(variable) else {
            continue;
        };
        let bot = root
            .entry("bot".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !bot.is_object() {
            *bot = Value::Object(Map::new());
        }
        if let Value::Object(bot) = bot {
            bot.insert(key.to_string(), Value::String(value));
        }
    }
}
