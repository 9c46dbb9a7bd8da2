use std::collections::BTreeMap;
use std::path::PathBuf;

use kvsync::{Backend, StoreConfig};
use kvsync_migrate::StoredRecord;
use kvsync_store::SqliteBackend;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::CliConfig;

pub type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

/// The database and store a command operates on.
pub struct Target {
    db_path: PathBuf,
    backend: SqliteBackend,
    store: StoreConfig,
}

impl Target {
    pub fn open(config: &CliConfig) -> Result<Self> {
        let db_path = config
            .db
            .clone()
            .ok_or("no database given: pass --db or set `db` in kvsync.toml")?;
        debug!(db = %db_path.display(), store = %config.store.name, "opening database");
        let backend = SqliteBackend::open(&db_path)?;
        Ok(Self {
            db_path,
            backend,
            store: config.store.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.store.name
    }

    async fn records(&self, store: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.backend.load_all(store).await?)
    }
}

fn decode(key: &str, data: &[u8]) -> Result<StoredRecord> {
    StoredRecord::from_bytes(data).map_err(|e| format!("record '{key}' is corrupt: {e}").into())
}

/// `kvsync status`: Show every store with record and version counts.
pub async fn status(target: &Target) -> Result {
    let stores = target.backend.list_stores().await?;
    println!("Database: {} (SQLite)", target.db_path.display());
    println!();

    if stores.is_empty() {
        println!("  (empty database)");
        return Ok(());
    }

    println!("  {:<20} {:>10} {:>10}  Versions", "Store", "Records", "Size");
    println!("  {}", "-".repeat(56));

    let mut total_records = 0u64;
    let mut total_bytes = 0u64;
    for store in &stores {
        let records = target.records(store).await?;
        let bytes: u64 = records.iter().map(|(_, d)| d.len() as u64).sum();
        let mut versions: BTreeMap<u32, u64> = BTreeMap::new();
        for (_, data) in &records {
            let version = if StoredRecord::bytes_are_tagged(data) {
                StoredRecord::peek_version(data).ok()
            } else {
                Some(0)
            };
            if let Some(v) = version {
                *versions.entry(v).or_default() += 1;
            }
        }
        let summary: Vec<String> = versions.iter().map(|(v, n)| format!("v{v}:{n}")).collect();

        println!(
            "  {:<20} {:>10} {:>10}  {}",
            truncate(store, 20),
            format_num(records.len() as u64),
            format_bytes(bytes),
            summary.join(" "),
        );
        total_records += records.len() as u64;
        total_bytes += bytes;
    }

    println!("  {}", "-".repeat(56));
    println!(
        "  {:<20} {:>10} {:>10}",
        "Total",
        format_num(total_records),
        format_bytes(total_bytes),
    );
    println!();
    Ok(())
}

/// `kvsync inspect [key]`: Inspect one record or list the store's records.
pub async fn inspect(target: &Target, key: Option<&str>) -> Result {
    match key {
        Some(key) => inspect_record(target, key).await,
        None => inspect_list(target).await,
    }
}

async fn inspect_record(target: &Target, key: &str) -> Result {
    let Some(data) = target.backend.load_one(target.name(), key).await? else {
        eprintln!("Record '{key}' not found in store '{}'", target.name());
        return Ok(());
    };

    println!("Record: {key}");
    println!("Store: {}", target.name());
    println!("Size: {} bytes", data.len());

    let record = decode(key, &data)?;
    if record.is_tagged() {
        println!("Version: v{}", record.version());
    } else {
        println!("Version: (untagged, v0)");
    }
    if record.version() < target.store.version {
        println!("Pending: migrates to v{} on next open", target.store.version);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(record.value())?);
    Ok(())
}

async fn inspect_list(target: &Target) -> Result {
    let records = target.records(target.name()).await?;
    println!("Store: {} ({} records)", target.name(), records.len());

    for (key, data) in &records {
        let version = match StoredRecord::from_bytes(data) {
            Ok(record) => format!("v{}", record.version()),
            Err(_) => "corrupt".to_string(),
        };
        println!("  {:<40} {:>8} {:>8} B", truncate(key, 40), version, data.len());
    }
    println!();
    Ok(())
}

/// `kvsync export`: Dump decoded values as JSON.
pub async fn export(target: &Target, all: bool) -> Result {
    let output = if all {
        let mut stores = Map::new();
        for store in target.backend.list_stores().await? {
            let values = export_store(target, &store).await?;
            stores.insert(store, values);
        }
        Value::Object(stores)
    } else {
        export_store(target, target.name()).await?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn export_store(target: &Target, store: &str) -> Result<Value> {
    let mut values = Map::new();
    for (key, data) in target.records(store).await? {
        let record = decode(&key, &data)?;
        values.insert(key, record.into_value());
    }
    Ok(Value::Object(values))
}

/// `kvsync get <key>`: Print one value.
pub async fn get(target: &Target, key: &str) -> Result {
    let data = target
        .backend
        .load_one(target.name(), key)
        .await?
        .ok_or_else(|| format!("record '{key}' not found in store '{}'", target.name()))?;
    let record = decode(key, &data)?;
    println!("{}", serde_json::to_string_pretty(record.value())?);
    Ok(())
}

/// `kvsync set <key> <json>`: Write one value at the configured version.
pub async fn set(target: &Target, key: &str, raw: &str) -> Result {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("value is not valid JSON: {e}"))?;
    let record = StoredRecord::for_version(target.store.version, value);
    target
        .backend
        .write_one(target.name(), key, record.to_bytes())
        .await?;
    println!("Wrote '{key}' to '{}' at v{}", target.name(), record.version());
    Ok(())
}

/// `kvsync delete <key>`: Remove one record.
pub async fn delete(target: &Target, key: &str) -> Result {
    target.backend.delete_one(target.name(), key).await?;
    println!("Deleted '{key}' from '{}'", target.name());
    Ok(())
}

/// `kvsync clear --yes`: Remove every record of the store.
pub async fn clear(target: &Target, confirmed: bool) -> Result {
    if !confirmed {
        return Err(format!("refusing to clear '{}' without --yes", target.name()).into());
    }
    let count = target.backend.count(target.name()).await?;
    target.backend.clear_all(target.name()).await?;
    println!("Cleared {} records from '{}'", format_num(count), target.name());
    Ok(())
}

// ── Formatting helpers ──────────────────────────────────────────────

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> (tempfile::TempDir, Target) {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig {
            db: Some(dir.path().join("cli.db")),
            store: StoreConfig {
                name: "prefs".into(),
                version: 2,
            },
        };
        let target = Target::open(&config).unwrap();
        (dir, target)
    }

    #[test]
    fn number_and_size_formatting() {
        assert_eq!(format_num(7), "7");
        assert_eq!(format_num(1000), "1,000");
        assert_eq!(format_num(1234567), "1,234,567");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-key", 8), "a-ver...");
    }

    #[test]
    fn missing_db_is_an_error() {
        let config = CliConfig::default();
        assert!(Target::open(&config).is_err());
    }

    #[tokio::test]
    async fn set_writes_tagged_record() {
        let (_dir, target) = target();
        set(&target, "theme", "{\"mode\": \"dark\"}").await.unwrap();

        let data = target.backend.load_one("prefs", "theme").await.unwrap().unwrap();
        let record = StoredRecord::from_bytes(&data).unwrap();
        assert_eq!(record.version(), 2);
        assert_eq!(record.value(), &json!({"mode": "dark"}));
    }

    #[tokio::test]
    async fn set_rejects_invalid_json() {
        let (_dir, target) = target();
        assert!(set(&target, "k", "{not json").await.is_err());
        assert_eq!(target.backend.count("prefs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn export_decodes_untagged_and_tagged() {
        let (_dir, target) = target();
        target.backend.write_one("prefs", "plain", b"1".to_vec()).await.unwrap();
        set(&target, "tagged", "[true]").await.unwrap();

        let values = export_store(&target, "prefs").await.unwrap();
        assert_eq!(values, json!({"plain": 1, "tagged": [true]}));
    }

    #[tokio::test]
    async fn clear_requires_confirmation() {
        let (_dir, target) = target();
        set(&target, "k", "1").await.unwrap();
        assert!(clear(&target, false).await.is_err());
        assert_eq!(target.backend.count("prefs").await.unwrap(), 1);
        clear(&target, true).await.unwrap();
        assert_eq!(target.backend.count("prefs").await.unwrap(), 0);
    }
}
