// ABOUTME: Process-shared hierarchical key/value store backed by SQLite.
// ABOUTME: Dotted paths, atomic counters, settings merge and configuration checks.

use crate::error::{BotError, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Transforms a stored value when a caller asks for filtering in [`Context::check`]
pub type ValueFilter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Validator used by [`Check::validate`]
pub type Validator = Box<dyn Fn(&Value) -> bool + Send + Sync>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS store_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

/// Shared store for every worker of a run.
///
/// Paths are dotted (`server.url`, `bot.store.planets`). Values are JSON.
/// Cloning a `Context` is cheap and clones share the same connection.
///
/// An in-memory store (`Context::new`) is shared by everything in one
/// process. A file-backed store (`Context::open`) can be opened by several
/// OS processes at once: every mutation is a single statement or an
/// immediate transaction, so counters stay exact under concurrent writers.
#[derive(Clone)]
pub struct Context {
    db: Arc<Mutex<Connection>>,
    filter: ValueFilter,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

impl Context {
    /// Create an empty in-memory store
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self::from_connection(conn))
    }

    /// Open (or create) a file-backed store that other processes may share
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute(SCHEMA, [])?;

        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened shared store");
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store pre-loaded with settings
    pub fn with_settings(settings: &Value) -> Result<Self> {
        let context = Self::new()?;
        context.apply(settings)?;
        Ok(context)
    }

    /// Replace the filter used by `check(.., filter)`
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            filter: Arc::new(resolve_environment),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard cannot leave SQLite half-written
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read a value, or `None` when the path is absent or explicitly null.
    ///
    /// When the path is not a key itself but prefixes stored keys, the
    /// nested mapping below it is rebuilt (`bot.store` → `{"planets": [..]}`).
    pub fn get(&self, path: &str) -> Option<Value> {
        match self.try_get(path) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to read shared store");
                None
            }
        }
    }

    fn try_get(&self, path: &str) -> Result<Option<Value>> {
        let conn = self.conn();
        let exact: Option<String> = conn
            .query_row(
                "SELECT value FROM store_entries WHERE key = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(raw) = exact {
            let value: Value = serde_json::from_str(&raw)?;
            return Ok((!value.is_null()).then_some(value));
        }

        let (low, high) = prefix_bounds(path);
        let mut stmt = conn.prepare(
            "SELECT key, value FROM store_entries WHERE key >= ?1 AND key < ?2 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![low, high], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut tree = Map::new();
        for row in rows {
            let (key, raw) = row?;
            let rest = &key[low.len()..];
            insert_nested(&mut tree, rest, serde_json::from_str(&raw)?);
        }

        Ok((!tree.is_empty()).then_some(Value::Object(tree)))
    }

    /// Read a value, falling back to `default` when absent or null
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Value {
        self.get(path).unwrap_or_else(|| default.into())
    }

    /// Read a value and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let value = self.get(path)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Stored value has an unexpected shape");
                None
            }
        }
    }

    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// Replace the value at `path` in one statement
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let raw = serde_json::to_string(&value.into())?;
        self.conn().execute(
            "INSERT INTO store_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![path, raw],
        )?;
        Ok(())
    }

    /// True when `path` is a key, or prefixes at least one key
    pub fn has(&self, path: &str) -> bool {
        if path.is_empty() || path.starts_with('.') {
            return false;
        }

        let (low, high) = prefix_bounds(path);
        let found = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM store_entries
                           WHERE key = ?1 OR (key >= ?2 AND key < ?3))",
            params![path, low, high],
            |row| row.get::<_, bool>(0),
        );
        match found {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to query shared store");
                false
            }
        }
    }

    /// Add `delta` to a counter and return the new value.
    ///
    /// A non-numeric or absent value counts as 0. The read and the write
    /// happen inside one immediate transaction, which holds the database
    /// write lock, so concurrent processes never lose an update. Overflow
    /// is a validation error and leaves the counter unchanged.
    pub fn increment(&self, path: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next = add_to_counter(&tx, path, delta)?;
        tx.commit()?;
        Ok(next)
    }

    /// Add `delta` to a counter and record under `flag` whether it is now
    /// positive, both in the same transaction as `increment`.
    pub fn track(&self, path: &str, delta: i64, flag: &str) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next = add_to_counter(&tx, path, delta)?;
        write_entry(&tx, flag, &Value::Bool(next > 0))?;
        tx.commit()?;
        Ok(next)
    }

    /// Subtract `delta` from a counter and return the new value
    pub fn decrement(&self, path: &str, delta: i64) -> Result<i64> {
        let delta = delta.checked_neg().ok_or_else(|| BotError::Validation {
            path: path.to_string(),
            reason: format!("cannot subtract {delta}"),
        })?;
        self.increment(path, delta)
    }

    /// Merge a tree of settings into dotted paths; last write wins.
    ///
    /// Top-level scalars without a dot land under `general.`, so
    /// `{"DEBUG": true}` becomes `general.DEBUG`.
    pub fn apply(&self, settings: &Value) -> Result<()> {
        let map = settings.as_object().ok_or_else(|| BotError::Validation {
            path: String::new(),
            reason: "settings must be a mapping".to_string(),
        })?;

        let mut entries = Vec::new();
        flatten(None, map, &mut entries);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (path, value) in entries {
            tx.execute(
                "INSERT INTO store_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![path, serde_json::to_string(&value)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every key
    pub fn clear(&self) -> Result<()> {
        self.conn().execute("DELETE FROM store_entries", [])?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.conn()
            .query_row(
                "SELECT NOT EXISTS(SELECT 1 FROM store_entries)",
                [],
                |row| row.get::<_, bool>(0),
            )
            .unwrap_or(true)
    }

    /// Check one configuration path.
    ///
    /// * absent + default: the default is stored
    /// * absent + (mandatory | validate | filter), no default: `MissingKey`
    /// * present + validator returning false: `Validation`
    /// * present + filter: the filtered value replaces the stored one
    pub fn check(&self, path: &str, check: Check) -> Result<()> {
        let Some(value) = self.get(path) else {
            if let Some(default) = check.default {
                return self.set(path, default);
            }
            if check.is_mandatory || check.validate.is_some() || check.filter {
                return Err(BotError::MissingKey(path.to_string()));
            }
            return Ok(());
        };

        if let Some(validate) = &check.validate {
            if !validate(&value) {
                return Err(BotError::Validation {
                    path: path.to_string(),
                    reason: format!("value {} was rejected", value),
                });
            }
        }

        if check.filter {
            let filtered = (self.filter)(&value);
            self.set(path, filtered)?;
        }

        Ok(())
    }
}

/// Options for [`Context::check`]
#[derive(Default)]
pub struct Check {
    default: Option<Value>,
    is_mandatory: bool,
    validate: Option<Validator>,
    filter: bool,
}

impl Check {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mandatory() -> Self {
        Self::new().is_mandatory(true)
    }

    pub fn default_value(value: impl Into<Value>) -> Self {
        Self::new().with_default(value)
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_mandatory(mut self, mandatory: bool) -> Self {
        self.is_mandatory = mandatory;
        self
    }

    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Box::new(validate));
        self
    }

    pub fn filter(mut self) -> Self {
        self.filter = true;
        self
    }
}

/// Default filter: resolve `$NAME` strings against the process environment.
///
/// Unknown variables resolve to null, empty ones to `""`; both are logged.
/// Everything else passes through unchanged.
pub fn resolve_environment(value: &Value) -> Value {
    let Some(name) = value.as_str().and_then(|s| s.strip_prefix('$')) else {
        return value.clone();
    };

    match std::env::var(name) {
        Ok(resolved) => {
            if resolved.is_empty() {
                tracing::warn!(variable = %name, "Environment variable is empty");
            }
            Value::String(resolved)
        }
        Err(_) => {
            tracing::warn!(variable = %name, "Environment variable is not set");
            Value::Null
        }
    }
}

/// Key range covering every path strictly below `path`
fn prefix_bounds(path: &str) -> (String, String) {
    // '/' sorts right after '.', so [path., path/) is exactly the subtree
    (format!("{path}."), format!("{path}/"))
}

fn flatten(prefix: Option<&str>, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten(Some(&path), inner, out),
            Value::Object(_) => out.push((path, value.clone())),
            _ if prefix.is_none() && !key.contains('.') => {
                out.push((format!("general.{key}"), value.clone()))
            }
            _ => out.push((path, value.clone())),
        }
    }
}

fn insert_nested(tree: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            tree.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = tree
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_nested(inner, rest, value);
            }
        }
    }
}

fn write_entry(tx: &rusqlite::Transaction<'_>, path: &str, value: &Value) -> Result<()> {
    tx.execute(
        "INSERT INTO store_entries (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![path, serde_json::to_string(value)?],
    )?;
    Ok(())
}

fn add_to_counter(tx: &rusqlite::Transaction<'_>, path: &str, delta: i64) -> Result<i64> {
    let current: Option<String> = tx
        .query_row(
            "SELECT value FROM store_entries WHERE key = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    let current = current
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|value| value.as_i64())
        .unwrap_or(0);

    let next = current
        .checked_add(delta)
        .ok_or_else(|| BotError::Validation {
            path: path.to_string(),
            reason: format!("counter overflow adding {delta} to {current}"),
        })?;
    write_entry(tx, path, &Value::from(next))?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_bounds_cover_subtree_only() {
        let (low, high) = prefix_bounds("spark");
        assert!("spark.room" >= low.as_str() && "spark.room" < high.as_str());
        assert!(!("sparkle" >= low.as_str() && "sparkle" < high.as_str()));
        assert!(!("spark" >= low.as_str()));
    }

    #[test]
    fn test_flatten_places_top_level_scalars_under_general() {
        let settings = json!({
            "DEBUG": true,
            "spark.room": "title",
            "server": {"port": 80},
        });
        let mut out = Vec::new();
        flatten(None, settings.as_object().unwrap(), &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            out,
            vec![
                ("general.DEBUG".to_string(), json!(true)),
                ("server.port".to_string(), json!(80)),
                ("spark.room".to_string(), json!("title")),
            ]
        );
    }

    #[test]
    fn test_insert_nested_builds_mapping() {
        let mut tree = Map::new();
        insert_nested(&mut tree, "a.b", json!(1));
        insert_nested(&mut tree, "a.c", json!(2));
        insert_nested(&mut tree, "d", json!("x"));
        assert_eq!(Value::Object(tree), json!({"a": {"b": 1, "c": 2}, "d": "x"}));
    }

    #[test]
    fn test_resolve_environment_passes_plain_values() {
        assert_eq!(resolve_environment(&json!("plain")), json!("plain"));
        assert_eq!(resolve_environment(&json!("")), json!(""));
        assert_eq!(resolve_environment(&json!(42)), json!(42));
        assert_eq!(resolve_environment(&Value::Null), Value::Null);
    }

    #[test]
    fn test_resolve_environment_unknown_variable_is_null() {
        assert_eq!(
            resolve_environment(&json!("$SHELLY_TOTALLY_UNKNOWN_VARIABLE")),
            Value::Null
        );
    }

    #[test]
    fn test_increment_overflow_is_rejected() {
        let context = Context::new().unwrap();
        context.set("gauge", i64::MAX).unwrap();

        let result = context.increment("gauge", 1);
        assert!(matches!(result, Err(BotError::Validation { .. })));
        assert_eq!(context.get_i64("gauge"), Some(i64::MAX));

        context.set("gauge", i64::MIN).unwrap();
        assert!(context.decrement("gauge", 1).is_err());
        assert!(context.decrement("other", i64::MIN).is_err());
        assert_eq!(context.get_i64("gauge"), Some(i64::MIN));
    }

    #[test]
    fn test_track_writes_counter_and_flag_together() {
        let context = Context::new().unwrap();

        assert_eq!(context.track("worker.active", 1, "worker.busy").unwrap(), 1);
        assert_eq!(context.get_bool("worker.busy"), Some(true));
        assert_eq!(context.track("worker.active", 1, "worker.busy").unwrap(), 2);
        assert_eq!(context.track("worker.active", -1, "worker.busy").unwrap(), 1);
        assert_eq!(context.get_bool("worker.busy"), Some(true));
        assert_eq!(context.track("worker.active", -1, "worker.busy").unwrap(), 0);
        assert_eq!(context.get_bool("worker.busy"), Some(false));
    }
}
