//! The registry wires the stores, compiler, engine, and canary router
//! together and is the only public mutation path for images, aliases,
//! and canaries. `main` constructs one registry and hands it to the
//! HTTP layer; nothing here is process-global.

use dashmap::DashMap;
use skein_core::canary::{CanaryRouter, CanaryState, CanaryStatus, VersionRef};
use skein_core::error::SkeinError;
use skein_core::image::PipelineImage;
use skein_core::refs::PipelineRef;
use skein_store::{PipelineStore, SuspensionStore, VersionStore, DEFAULT_SUSPENSION_CAPACITY};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Result of compiling (and possibly naming) a source text.
#[derive(Debug, Clone)]
pub struct CompileSummary {
    pub structural_hash: String,
    pub syntactic_hash: String,
    pub name: Option<String>,
    /// True when the syntactic index short-circuited recompilation.
    pub reused: bool,
}

pub struct Registry {
    pipelines: Arc<PipelineStore>,
    versions: Arc<VersionStore>,
    suspensions: Arc<SuspensionStore>,
    canaries: Arc<CanaryRouter>,
    /// Per-name serialization of reload / rollback / canary lifecycle.
    reload_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Remembered source file per name, populated by the bulk loader,
    /// so `reload` can re-read without a request body.
    source_paths: DashMap<String, PathBuf>,
}

impl Registry {
    pub fn new(
        pipelines: Arc<PipelineStore>,
        versions: Arc<VersionStore>,
        suspensions: Arc<SuspensionStore>,
        canaries: Arc<CanaryRouter>,
    ) -> Self {
        Self {
            pipelines,
            versions,
            suspensions,
            canaries,
            reload_locks: DashMap::new(),
            source_paths: DashMap::new(),
        }
    }

    /// Everything in memory; used by tests and by servers run without a
    /// data directory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(PipelineStore::in_memory()),
            Arc::new(VersionStore::in_memory()),
            Arc::new(SuspensionStore::in_memory(DEFAULT_SUSPENSION_CAPACITY)),
            Arc::new(CanaryRouter::new()),
        )
    }

    /// Stores mirrored under `dir`, state restored from disk.
    pub fn with_mirror(dir: &Path, suspension_capacity: usize, latency_ring: usize) -> Self {
        Self::new(
            Arc::new(PipelineStore::open(dir)),
            Arc::new(VersionStore::open(dir)),
            Arc::new(SuspensionStore::open(dir, suspension_capacity)),
            Arc::new(CanaryRouter::with_latency_ring(latency_ring)),
        )
    }

    pub fn pipelines(&self) -> &PipelineStore {
        &self.pipelines
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn suspensions(&self) -> &SuspensionStore {
        &self.suspensions
    }

    pub fn canaries(&self) -> &CanaryRouter {
        &self.canaries
    }

    pub(crate) fn reload_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.reload_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn remember_source_path(&self, name: &str, path: PathBuf) {
        self.source_paths.insert(name.to_string(), path);
    }

    pub(crate) fn source_path(&self, name: &str) -> Option<PathBuf> {
        self.source_paths.get(name).map(|p| p.clone())
    }

    fn guard_no_active_canary(&self, name: &str) -> Result<(), SkeinError> {
        if let Some(state) = self.canaries.get_state(name) {
            if state.status == CanaryStatus::Observing {
                return Err(SkeinError::Conflict(format!(
                    "pipeline `{name}` has an active canary"
                )));
            }
        }
        Ok(())
    }

    /// Compile `source`, store the image (deduplicating via the
    /// syntactic index), and — when `name` is given — bind the alias.
    /// Version history for a name begins with its first reload; a bare
    /// compile only names the image, so an unversioned image can still
    /// be unaliased and deleted.
    pub fn compile_and_store(
        &self,
        source: &str,
        name: Option<&str>,
    ) -> Result<CompileSummary, SkeinError> {
        let syntactic_hash = skein_dsl::syntactic_hash(source);

        let (structural_hash, reused) = match self
            .pipelines
            .lookup_syntactic(&syntactic_hash)
            .filter(|h| self.pipelines.contains(h))
        {
            Some(hash) => (hash, true),
            None => {
                // Compile outside every store lock.
                let image = skein_dsl::compile(source).map_err(SkeinError::CompileError)?;
                let hash = image.structural_hash.clone();
                self.pipelines.store(image)?;
                self.pipelines.index_syntactic(&syntactic_hash, &hash)?;
                (hash, false)
            }
        };

        if let Some(name) = name {
            self.guard_no_active_canary(name)?;
            self.pipelines.alias(name, &structural_hash)?;
        }

        Ok(CompileSummary {
            structural_hash,
            syntactic_hash,
            name: name.map(str::to_string),
            reused,
        })
    }

    /// Resolve a ref for read-only purposes (no canary routing).
    pub fn resolve_image(&self, ref_str: &str) -> Result<Arc<PipelineImage>, SkeinError> {
        match PipelineRef::parse(ref_str)? {
            PipelineRef::Hash(hash) => self
                .pipelines
                .get(&hash)
                .ok_or_else(|| SkeinError::NotFound(format!("pipeline {hash}"))),
            PipelineRef::Alias(name) => self
                .pipelines
                .get_by_name(&name)
                .ok_or_else(|| SkeinError::NotFound(format!("pipeline `{name}`"))),
        }
    }

    /// Resolve a ref for execution. Alias-form refs may be routed by an
    /// observing canary; the returned context carries the name so the
    /// result can be fed back into the canary's metrics.
    pub(crate) fn resolve_for_execution(
        &self,
        ref_str: &str,
    ) -> Result<(Arc<PipelineImage>, Option<String>), SkeinError> {
        match PipelineRef::parse(ref_str)? {
            PipelineRef::Hash(hash) => {
                let image = self
                    .pipelines
                    .get(&hash)
                    .ok_or_else(|| SkeinError::NotFound(format!("pipeline {hash}")))?;
                Ok((image, None))
            }
            PipelineRef::Alias(name) => {
                if let Some(hash) = self.canaries.select_version(&name) {
                    let image = self.pipelines.get(&hash).ok_or_else(|| {
                        SkeinError::NotFound(format!("canary target {hash} for `{name}`"))
                    })?;
                    return Ok((image, Some(name)));
                }
                let image = self
                    .pipelines
                    .get_by_name(&name)
                    .ok_or_else(|| SkeinError::NotFound(format!("pipeline `{name}`")))?;
                Ok((image, None))
            }
        }
    }

    /// Feed an execution result into the canary for `name` and commit
    /// any resulting terminal transition.
    pub(crate) fn record_canary_result(
        &self,
        name: &str,
        hash: &str,
        success: bool,
        latency_ms: f64,
    ) {
        let Some(state) = self.canaries.record_result(name, hash, success, latency_ms) else {
            return;
        };
        match state.status {
            CanaryStatus::Complete => self.commit_canary_completion(&state),
            CanaryStatus::RolledBack => self.commit_canary_rollback(&state),
            CanaryStatus::Observing => {}
        }
    }

    /// A completed canary makes the promotion stick: the alias is
    /// repointed at the new hash. Idempotent under concurrent callers.
    fn commit_canary_completion(&self, state: &CanaryState) {
        let name = &state.pipeline_name;
        let hash = &state.new_version.structural_hash;
        if self.pipelines.resolve(name).as_deref() == Some(hash.as_str()) {
            return;
        }
        match self.pipelines.alias(name, hash) {
            Ok(()) => info!(pipeline = %name, hash = %hash, "canary promotion committed"),
            Err(e) => warn!(pipeline = %name, error = %e, "failed to commit canary promotion"),
        }
    }

    /// A rolled-back canary restores the active-version pointer to the
    /// old side, so the glossary invariant (active version = the version
    /// the alias points at) holds again.
    fn commit_canary_rollback(&self, state: &CanaryState) {
        let name = &state.pipeline_name;
        let old = state.old_version.version;
        if self.versions.active_version(name) == Some(old) {
            return;
        }
        match self.versions.set_active_version(name, old) {
            Ok(true) => info!(pipeline = %name, version = old, "canary rollback committed"),
            Ok(false) => warn!(pipeline = %name, version = old, "rollback target version missing"),
            Err(e) => warn!(pipeline = %name, error = %e, "failed to commit canary rollback"),
        }
    }

    pub fn canary_state(&self, name: &str) -> Option<CanaryState> {
        self.canaries.get_state(name)
    }

    pub fn promote_canary(&self, name: &str) -> Result<CanaryState, SkeinError> {
        let state = self
            .canaries
            .promote(name)
            .ok_or_else(|| SkeinError::NotFound(format!("no canary for `{name}`")))?;
        if state.status == CanaryStatus::Complete {
            self.commit_canary_completion(&state);
        }
        Ok(state)
    }

    pub fn rollback_canary(&self, name: &str) -> Result<CanaryState, SkeinError> {
        let state = self
            .canaries
            .rollback(name)
            .ok_or_else(|| SkeinError::NotFound(format!("no canary for `{name}`")))?;
        if state.status == CanaryStatus::RolledBack {
            self.commit_canary_rollback(&state);
        }
        Ok(state)
    }

    pub fn delete_canary(&self, name: &str) -> Result<CanaryState, SkeinError> {
        let state = self
            .canaries
            .remove(name)
            .ok_or_else(|| SkeinError::NotFound(format!("no canary for `{name}`")))?;
        if state.status == CanaryStatus::RolledBack {
            self.commit_canary_rollback(&state);
        }
        Ok(state)
    }

    /// Start a canary directly between two stored versions of a name
    /// (the reload path builds the version refs itself).
    pub(crate) fn start_canary(
        &self,
        name: &str,
        old: VersionRef,
        new: VersionRef,
        config: skein_core::canary::CanaryConfig,
    ) -> Result<CanaryState, SkeinError> {
        self.canaries.start_canary(name, old, new, config)
    }

    /// Delete an image by hash under the global reference policy: no
    /// alias, no version entry, no observing canary, and no suspension
    /// may reference it. Returns `Ok(false)` when a reference blocks the
    /// delete (the HTTP layer maps that to 409).
    pub fn remove_image_by_hash(&self, hash: &str) -> Result<bool, SkeinError> {
        if !self.pipelines.contains(hash) {
            return Err(SkeinError::NotFound(format!("pipeline {hash}")));
        }
        if self.versions.references_hash(hash)
            || self.canaries.references_hash(hash)
            || self.suspensions.references_hash(hash)
        {
            return Ok(false);
        }
        let removed = self.pipelines.remove(hash)?;
        if removed {
            self.pipelines.unindex_structural(hash)?;
        }
        Ok(removed)
    }

    /// Bind `name` to `hash` (PUT alias). The target must exist.
    pub fn set_alias(&self, name: &str, hash: &str) -> Result<(), SkeinError> {
        self.guard_no_active_canary(name)?;
        self.pipelines.alias(name, hash)
    }

    /// Drop the alias `name`. A DELETE on an alias-form ref removes the
    /// binding, never the image.
    pub fn remove_alias(&self, name: &str) -> Result<bool, SkeinError> {
        self.guard_no_active_canary(name)?;
        self.pipelines.unalias(name)
    }
}
