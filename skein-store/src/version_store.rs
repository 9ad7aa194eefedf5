//! Per-name monotonic version history with an active-version pointer.
//!
//! Version numbers for a name are the contiguous sequence 1..N and are
//! never reused. Updates are read-modify-write under one lock; the
//! persistence write happens inside the critical section so memory and
//! disk cannot diverge. Compile and engine work never runs under this
//! lock.

use crate::persist::{read_json_tolerant, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skein_core::error::SkeinError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const VERSIONS_FILE: &str = "versions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineVersion {
    pub version: u32,
    pub structural_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NameHistory {
    versions: Vec<PipelineVersion>,
    active: u32,
}

impl NameHistory {
    fn is_consistent(&self) -> bool {
        self.versions
            .iter()
            .enumerate()
            .all(|(i, v)| v.version == i as u32 + 1)
            && self.active >= 1
            && self.active <= self.versions.len() as u32
    }
}

pub struct VersionStore {
    names: Mutex<HashMap<String, NameHistory>>,
    path: Option<PathBuf>,
}

impl VersionStore {
    pub fn in_memory() -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open against a mirror directory, restoring `versions.json` if
    /// present. Histories that fail the contiguity check are dropped
    /// with a warning.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(VERSIONS_FILE);
        let mut names = HashMap::new();
        if let Some(persisted) = read_json_tolerant::<HashMap<String, NameHistory>>(&path) {
            for (name, history) in persisted {
                if history.is_consistent() {
                    names.insert(name, history);
                } else {
                    warn!(pipeline = %name, "version history inconsistent, dropping");
                }
            }
        }
        info!(pipelines = names.len(), "version store restored");
        Self {
            names: Mutex::new(names),
            path: Some(path),
        }
    }

    fn persist(&self, names: &HashMap<String, NameHistory>) -> Result<(), SkeinError> {
        match &self.path {
            Some(path) => write_json_atomic(path, names),
            None => Ok(()),
        }
    }

    /// Allocate the next version for `name`, marking it active.
    pub fn record_version(
        &self,
        name: &str,
        structural_hash: &str,
        source_text: Option<String>,
    ) -> Result<PipelineVersion, SkeinError> {
        let mut names = self.names.lock().expect("version lock");
        let history = names.entry(name.to_string()).or_insert(NameHistory {
            versions: Vec::new(),
            active: 0,
        });
        let version = PipelineVersion {
            version: history.versions.len() as u32 + 1,
            structural_hash: structural_hash.to_string(),
            created_at: Utc::now(),
            source_text,
        };
        let previous_active = history.active;
        history.versions.push(version.clone());
        history.active = version.version;

        if let Err(e) = self.persist(&names) {
            // Undo so memory never runs ahead of a failed disk write.
            let history = names.get_mut(name).expect("just inserted");
            history.versions.pop();
            history.active = previous_active;
            if history.versions.is_empty() {
                names.remove(name);
            }
            return Err(e);
        }
        info!(pipeline = %name, version = version.version, hash = %structural_hash, "version recorded");
        Ok(version)
    }

    /// All versions for `name`, newest first.
    pub fn list_versions(&self, name: &str) -> Vec<PipelineVersion> {
        let names = self.names.lock().expect("version lock");
        names
            .get(name)
            .map(|h| {
                let mut versions = h.versions.clone();
                versions.reverse();
                versions
            })
            .unwrap_or_default()
    }

    pub fn active_version(&self, name: &str) -> Option<u32> {
        let names = self.names.lock().expect("version lock");
        names.get(name).map(|h| h.active)
    }

    /// Structural hash of the currently active version.
    pub fn active_hash(&self, name: &str) -> Option<String> {
        let names = self.names.lock().expect("version lock");
        let history = names.get(name)?;
        history
            .versions
            .get(history.active.checked_sub(1)? as usize)
            .map(|v| v.structural_hash.clone())
    }

    /// Move the active pointer to an existing version. Returns `false`
    /// (without touching anything) when `v` does not exist under `name`.
    pub fn set_active_version(&self, name: &str, v: u32) -> Result<bool, SkeinError> {
        let mut names = self.names.lock().expect("version lock");
        let Some(history) = names.get_mut(name) else {
            return Ok(false);
        };
        if v < 1 || v > history.versions.len() as u32 {
            return Ok(false);
        }
        let previous = history.active;
        history.active = v;
        if let Err(e) = self.persist(&names) {
            names.get_mut(name).expect("present").active = previous;
            return Err(e);
        }
        info!(pipeline = %name, version = v, "active version set");
        Ok(true)
    }

    pub fn get_version(&self, name: &str, v: u32) -> Option<PipelineVersion> {
        let names = self.names.lock().expect("version lock");
        names
            .get(name)?
            .versions
            .get(v.checked_sub(1)? as usize)
            .cloned()
    }

    /// The version with the highest number strictly below the active
    /// one.
    pub fn previous_version(&self, name: &str) -> Option<PipelineVersion> {
        let names = self.names.lock().expect("version lock");
        let history = names.get(name)?;
        let target = history.active.checked_sub(1)?;
        history.versions.get(target.checked_sub(1)? as usize).cloned()
    }

    /// True when any version entry of any name references `hash`.
    pub fn references_hash(&self, hash: &str) -> bool {
        let names = self.names.lock().expect("version lock");
        names
            .values()
            .any(|h| h.versions.iter().any(|v| v.structural_hash == hash))
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let names = self.names.lock().expect("version lock");
        let mut out: Vec<String> = names.keys().cloned().collect();
        out.sort();
        out
    }
}
