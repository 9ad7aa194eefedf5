//! The authoritative content-addressed image store.
//!
//! Images live in a concurrent map keyed by structural hash and are
//! immutable once stored. The alias map and the syntactic index are
//! guarded by mutexes so their atomic file persistence happens inside
//! the critical section: in-memory state commits only after the disk
//! write succeeds. Image files themselves are idempotent and are
//! written before the in-memory insert.

use crate::persist::{read_json_tolerant, remove_file_if_exists, write_json_atomic};
use dashmap::DashMap;
use skein_core::error::SkeinError;
use skein_core::image::{ImageSummary, PipelineImage};
use skein_core::refs::validate_alias_name;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const ALIASES_FILE: &str = "aliases.json";
const SYNTACTIC_FILE: &str = "syntactic-index.json";
const IMAGES_DIR: &str = "images";

pub struct PipelineStore {
    images: DashMap<String, Arc<PipelineImage>>,
    aliases: Mutex<HashMap<String, String>>,
    syntactic: Mutex<HashMap<String, String>>,
    dir: Option<PathBuf>,
}

impl PipelineStore {
    /// A store with no filesystem mirror.
    pub fn in_memory() -> Self {
        Self {
            images: DashMap::new(),
            aliases: Mutex::new(HashMap::new()),
            syntactic: Mutex::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a store mirrored at `dir`, restoring any persisted state.
    /// Corrupt files are skipped with a warning; a missing directory is
    /// simply a fresh store (it is created on first write).
    pub fn open(dir: &Path) -> Self {
        let store = Self {
            images: DashMap::new(),
            aliases: Mutex::new(HashMap::new()),
            syntactic: Mutex::new(HashMap::new()),
            dir: Some(dir.to_path_buf()),
        };
        store.restore();
        store
    }

    fn restore(&self) {
        let Some(dir) = &self.dir else { return };

        let images_dir = dir.join(IMAGES_DIR);
        if let Ok(entries) = std::fs::read_dir(&images_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(image) = read_json_tolerant::<PipelineImage>(&path) else {
                    continue;
                };
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
                if image.structural_hash != stem {
                    warn!(
                        path = %path.display(),
                        hash = %image.structural_hash,
                        "image file name does not match its hash, skipping"
                    );
                    continue;
                }
                self.images
                    .insert(image.structural_hash.clone(), Arc::new(image));
            }
        }

        if let Some(persisted) =
            read_json_tolerant::<HashMap<String, String>>(&dir.join(ALIASES_FILE))
        {
            let mut aliases = self.aliases.lock().expect("alias lock");
            for (name, hash) in persisted {
                if self.images.contains_key(&hash) {
                    aliases.insert(name, hash);
                } else {
                    warn!(alias = %name, hash = %hash, "alias target missing, dropping");
                }
            }
        }

        if let Some(persisted) =
            read_json_tolerant::<HashMap<String, String>>(&dir.join(SYNTACTIC_FILE))
        {
            let mut syntactic = self.syntactic.lock().expect("syntactic lock");
            for (syn, structural) in persisted {
                if self.images.contains_key(&structural) {
                    syntactic.insert(syn, structural);
                } else {
                    warn!(
                        syntactic = %syn,
                        structural = %structural,
                        "syntactic index target missing, dropping"
                    );
                }
            }
        }

        info!(
            images = self.images.len(),
            dir = %dir.display(),
            "pipeline store restored"
        );
    }

    fn image_path(&self, hash: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(IMAGES_DIR).join(format!("{hash}.json")))
    }

    /// Insert an image, idempotent by structural hash. The image file is
    /// written before the in-memory commit; existing entries are never
    /// overwritten.
    pub fn store(&self, image: PipelineImage) -> Result<(), SkeinError> {
        if self.images.contains_key(&image.structural_hash) {
            return Ok(());
        }
        if let Some(path) = self.image_path(&image.structural_hash) {
            write_json_atomic(&path, &image)?;
        }
        info!(hash = %image.structural_hash, "image stored");
        self.images
            .insert(image.structural_hash.clone(), Arc::new(image));
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<Arc<PipelineImage>> {
        self.images.get(hash).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.images.contains_key(hash)
    }

    /// Alias lookup only.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.aliases.lock().expect("alias lock").get(name).cloned()
    }

    /// Alias resolution and image fetch under the alias lock, for
    /// callers that need a consistent snapshot of what a name means.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<PipelineImage>> {
        let aliases = self.aliases.lock().expect("alias lock");
        let hash = aliases.get(name)?;
        self.images.get(hash).map(|e| Arc::clone(e.value()))
    }

    /// Bind `name` to `hash`, replacing any previous binding. Fails if
    /// the target image is absent.
    pub fn alias(&self, name: &str, hash: &str) -> Result<(), SkeinError> {
        let name = validate_alias_name(name)?;
        if !self.images.contains_key(hash) {
            return Err(SkeinError::NotFound(format!(
                "cannot alias `{name}`: image {hash} not in store"
            )));
        }
        let mut aliases = self.aliases.lock().expect("alias lock");
        let mut next = aliases.clone();
        next.insert(name.clone(), hash.to_string());
        self.persist_aliases(&next)?;
        *aliases = next;
        info!(alias = %name, hash = %hash, "alias set");
        Ok(())
    }

    pub fn unalias(&self, name: &str) -> Result<bool, SkeinError> {
        let mut aliases = self.aliases.lock().expect("alias lock");
        if !aliases.contains_key(name) {
            return Ok(false);
        }
        let mut next = aliases.clone();
        next.remove(name);
        self.persist_aliases(&next)?;
        *aliases = next;
        info!(alias = %name, "alias removed");
        Ok(true)
    }

    fn persist_aliases(&self, aliases: &HashMap<String, String>) -> Result<(), SkeinError> {
        match &self.dir {
            Some(dir) => write_json_atomic(&dir.join(ALIASES_FILE), aliases),
            None => Ok(()),
        }
    }

    /// All aliases currently bound to `hash`.
    pub fn aliases_for(&self, hash: &str) -> Vec<String> {
        let aliases = self.aliases.lock().expect("alias lock");
        let mut names: Vec<String> = aliases
            .iter()
            .filter(|(_, h)| h.as_str() == hash)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub fn list_aliases(&self) -> HashMap<String, String> {
        self.aliases.lock().expect("alias lock").clone()
    }

    /// Remove an image, provided no alias references it. Referencing
    /// version entries, canaries, and suspensions are checked by the
    /// caller before this is invoked. Returns `false` when still
    /// aliased or absent.
    pub fn remove(&self, hash: &str) -> Result<bool, SkeinError> {
        let aliases = self.aliases.lock().expect("alias lock");
        if aliases.values().any(|h| h == hash) {
            return Ok(false);
        }
        if !self.images.contains_key(hash) {
            return Ok(false);
        }
        if let Some(path) = self.image_path(hash) {
            remove_file_if_exists(&path)?;
        }
        self.images.remove(hash);
        info!(hash = %hash, "image removed");
        Ok(true)
    }

    pub fn list_images(&self) -> Vec<ImageSummary> {
        let aliases = self.aliases.lock().expect("alias lock");
        let mut summaries: Vec<ImageSummary> = self
            .images
            .iter()
            .map(|entry| {
                let image = entry.value();
                let mut names: Vec<String> = aliases
                    .iter()
                    .filter(|(_, h)| h.as_str() == image.structural_hash)
                    .map(|(n, _)| n.clone())
                    .collect();
                names.sort();
                ImageSummary {
                    structural_hash: image.structural_hash.clone(),
                    syntactic_hash: image.syntactic_hash.clone(),
                    aliases: names,
                    compiled_at: image.compiled_at,
                    module_count: image.module_count,
                    declared_outputs: image.declared_outputs.clone(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.structural_hash.cmp(&b.structural_hash));
        summaries
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Record a syntactic → structural mapping. The target must exist.
    pub fn index_syntactic(
        &self,
        syntactic_hash: &str,
        structural_hash: &str,
    ) -> Result<(), SkeinError> {
        if !self.images.contains_key(structural_hash) {
            return Err(SkeinError::NotFound(format!(
                "cannot index syntactic hash: image {structural_hash} not in store"
            )));
        }
        let mut syntactic = self.syntactic.lock().expect("syntactic lock");
        let mut next = syntactic.clone();
        next.insert(syntactic_hash.to_string(), structural_hash.to_string());
        if let Some(dir) = &self.dir {
            write_json_atomic(&dir.join(SYNTACTIC_FILE), &next)?;
        }
        *syntactic = next;
        Ok(())
    }

    pub fn lookup_syntactic(&self, syntactic_hash: &str) -> Option<String> {
        self.syntactic
            .lock()
            .expect("syntactic lock")
            .get(syntactic_hash)
            .cloned()
    }

    /// Drop index entries pointing at `hash` (called after image removal
    /// so lookups never resolve to a missing image).
    pub fn unindex_structural(&self, hash: &str) -> Result<(), SkeinError> {
        let mut syntactic = self.syntactic.lock().expect("syntactic lock");
        if !syntactic.values().any(|h| h == hash) {
            return Ok(());
        }
        let next: HashMap<String, String> = syntactic
            .iter()
            .filter(|(_, h)| h.as_str() != hash)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(dir) = &self.dir {
            write_json_atomic(&dir.join(SYNTACTIC_FILE), &next)?;
        }
        *syntactic = next;
        Ok(())
    }
}
