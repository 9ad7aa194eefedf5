//! Durable, bounded store of resumable execution records.
//!
//! A record holds everything needed to continue an incomplete run:
//! the image hash, the typed inputs provided so far, every node value
//! already resolved, and what is still missing. Records are created on
//! first suspension, rewritten on each resume, and deleted on
//! completion. The store is bounded; when full, the record with the
//! oldest `created_at` is evicted first.

use crate::persist::{read_json_tolerant, remove_file_if_exists, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skein_core::error::SkeinError;
use skein_core::types::TypeDescriptor;
use skein_core::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const SUSPENSIONS_DIR: &str = "suspensions";

/// Default bound on retained records.
pub const DEFAULT_SUSPENSION_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspensionRecord {
    pub execution_id: uuid::Uuid,
    pub structural_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub resumption_count: u32,
    pub provided_inputs: BTreeMap<String, Value>,
    pub resolved_nodes: HashMap<u32, Value>,
    pub missing_inputs: BTreeMap<String, TypeDescriptor>,
    pub pending_outputs: Vec<String>,
}

pub struct SuspensionStore {
    records: Mutex<HashMap<uuid::Uuid, SuspensionRecord>>,
    dir: Option<PathBuf>,
    capacity: usize,
}

impl SuspensionStore {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            dir: None,
            capacity: capacity.max(1),
        }
    }

    /// Open against a mirror directory, restoring persisted records.
    /// Corrupt files are skipped with a warning.
    pub fn open(dir: &Path, capacity: usize) -> Self {
        let suspensions = dir.join(SUSPENSIONS_DIR);
        let mut records = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&suspensions) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(record) = read_json_tolerant::<SuspensionRecord>(&path) {
                    records.insert(record.execution_id, record);
                }
            }
        }
        info!(suspensions = records.len(), "suspension store restored");
        Self {
            records: Mutex::new(records),
            dir: Some(suspensions),
            capacity: capacity.max(1),
        }
    }

    fn record_path(&self, id: &uuid::Uuid) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{id}.json")))
    }

    /// Insert or replace the record for its execution id, evicting the
    /// oldest records if the bound is exceeded.
    pub fn upsert(&self, record: SuspensionRecord) -> Result<(), SkeinError> {
        if let Some(path) = self.record_path(&record.execution_id) {
            write_json_atomic(&path, &record)?;
        }
        let mut records = self.records.lock().expect("suspension lock");
        records.insert(record.execution_id, record);

        while records.len() > self.capacity {
            let oldest = records
                .values()
                .min_by_key(|r| r.created_at)
                .map(|r| r.execution_id)
                .expect("non-empty");
            records.remove(&oldest);
            warn!(execution_id = %oldest, "suspension evicted (store full)");
            if let Some(path) = self.record_path(&oldest) {
                if let Err(e) = remove_file_if_exists(&path) {
                    warn!(error = %e, "failed to remove evicted suspension file");
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &uuid::Uuid) -> Option<SuspensionRecord> {
        self.records.lock().expect("suspension lock").get(id).cloned()
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<SuspensionRecord> {
        let records = self.records.lock().expect("suspension lock");
        let mut out: Vec<SuspensionRecord> = records.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn delete(&self, id: &uuid::Uuid) -> Result<bool, SkeinError> {
        let mut records = self.records.lock().expect("suspension lock");
        if records.remove(id).is_none() {
            return Ok(false);
        }
        if let Some(path) = self.record_path(id) {
            remove_file_if_exists(&path)?;
        }
        info!(execution_id = %id, "suspension deleted");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("suspension lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when any record references `hash`.
    pub fn references_hash(&self, hash: &str) -> bool {
        self.records
            .lock()
            .expect("suspension lock")
            .values()
            .any(|r| r.structural_hash == hash)
    }
}
