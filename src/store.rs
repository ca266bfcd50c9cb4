//! Key-indexed row storage behind the match registry and the score ledger.
//!
//! Rows are plain JSON values. Single-row writes are the only atomicity the
//! engine relies on; anything spanning rows is serialized by the coordinator.

use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::debug;

use crate::error::StoreError;

pub trait RowStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn put(&self, key: &str, row: Value) -> Result<(), StoreError>;

    fn append_log(&self, row: Value) -> Result<(), StoreError>;

    /// All rows whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

fn collect_prefix(rows: &BTreeMap<String, Value>, prefix: &str) -> Vec<(String, Value)> {
    rows.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, row)| (key.clone(), row.clone()))
        .collect()
}

// ── In-memory store ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRowStore {
    rows: Mutex<BTreeMap<String, Value>>,
    log: Mutex<Vec<Value>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        MemoryRowStore::default()
    }

    pub fn log_rows(&self) -> Vec<Value> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RowStore for MemoryRowStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &str, row: Value) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.to_string(), row);
        Ok(())
    }

    fn append_log(&self, row: Value) -> Result<(), StoreError> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(row);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collect_prefix(&guard, prefix))
    }
}

// ── JSON file store ────────────────────────────────────────────────────

/// Durable store: the whole table lives in `rows.json` (rewritten through a
/// temp file on every put) and the audit log is appended to `log.jsonl`.
pub struct JsonFileRowStore {
    rows_path: PathBuf,
    log_path: PathBuf,
    rows: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileRowStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let rows_path = dir.join("rows.json");
        let log_path = dir.join("log.jsonl");

        let rows = if rows_path.is_file() {
            let data = fs::read_to_string(&rows_path).map_err(|source| StoreError::Io {
                path: rows_path.clone(),
                source,
            })?;
            serde_json::from_str::<BTreeMap<String, Value>>(&data).map_err(|source| {
                StoreError::Serde {
                    key: rows_path.display().to_string(),
                    source,
                }
            })?
        } else {
            BTreeMap::new()
        };
        debug!("opened row store at {} with {} rows", dir.display(), rows.len());

        Ok(JsonFileRowStore {
            rows_path,
            log_path,
            rows: Mutex::new(rows),
        })
    }

    fn flush(&self, rows: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let payload = serde_json::to_string_pretty(rows).map_err(|source| StoreError::Serde {
            key: self.rows_path.display().to_string(),
            source,
        })?;
        let tmp = self.rows_path.with_extension("json.tmp");
        fs::write(&tmp, payload).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.rows_path).map_err(|source| StoreError::Io {
            path: self.rows_path.clone(),
            source,
        })
    }
}

impl RowStore for JsonFileRowStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &str, row: Value) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let previous = guard.insert(key.to_string(), row);
        if let Err(err) = self.flush(&guard) {
            // Keep memory and disk in agreement when the write fails.
            match previous {
                Some(old) => guard.insert(key.to_string(), old),
                None => guard.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    fn append_log(&self, row: Value) -> Result<(), StoreError> {
        let line = serde_json::to_string(&row).map_err(|source| StoreError::Serde {
            key: "log".to_string(),
            source,
        })?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|source| StoreError::Io {
                path: self.log_path.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| StoreError::Io {
            path: self.log_path.clone(),
            source,
        })
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collect_prefix(&guard, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryRowStore::new();
        store.put("match/B/0002", json!({ "n": 2 })).unwrap();
        store.put("match/A/0001", json!({ "n": 1 })).unwrap();
        store.put("score/A/0001/top", json!([1])).unwrap();

        let rows = store.scan_prefix("match/").unwrap();
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["match/A/0001", "match/B/0002"]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileRowStore::open(dir.path()).unwrap();
            store.put("match/A/0001", json!({ "court": "A" })).unwrap();
            store.append_log(json!({ "kind": "start" })).unwrap();
            store.append_log(json!({ "kind": "score" })).unwrap();
        }

        let reopened = JsonFileRowStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("match/A/0001").unwrap(),
            Some(json!({ "court": "A" }))
        );
        let log = fs::read_to_string(dir.path().join("log.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }
}
