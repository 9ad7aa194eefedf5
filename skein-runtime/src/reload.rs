//! Hot reload: atomically replace what a name means, optionally under a
//! canary. Reloads of one name are serialized by a per-name lock;
//! different names reload in parallel. Compilation happens before any
//! store mutation, so a failed compile changes nothing.

use crate::registry::Registry;
use skein_core::canary::{CanaryConfig, CanaryState, VersionRef};
use skein_core::error::SkeinError;
use tracing::info;

/// Result of a reload request.
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub changed: bool,
    pub previous_hash: String,
    pub new_hash: String,
    pub version: Option<u32>,
    pub canary: Option<CanaryState>,
}

/// Result of a rollback request.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub version: u32,
    pub structural_hash: String,
    pub previous_hash: Option<String>,
}

impl Registry {
    /// Recompile `name` from the supplied source (or its remembered
    /// file) and swap the name over to the result. With a canary config
    /// the alias swap is deferred until the canary completes.
    pub fn reload(
        &self,
        name: &str,
        source: Option<&str>,
        canary: Option<CanaryConfig>,
    ) -> Result<ReloadOutcome, SkeinError> {
        let lock = self.reload_lock(name);
        let _guard = lock.lock().expect("reload lock");

        let previous_hash = self
            .pipelines()
            .resolve(name)
            .ok_or_else(|| SkeinError::NotFound(format!("pipeline `{name}`")))?;

        let source_text = match source {
            Some(text) => text.to_string(),
            None => {
                let path = self.source_path(name).ok_or_else(|| {
                    SkeinError::NoSource(format!(
                        "no source in request and no remembered file for `{name}`"
                    ))
                })?;
                std::fs::read_to_string(&path).map_err(|e| {
                    SkeinError::NoSource(format!(
                        "failed to re-read {} for `{name}`: {e}",
                        path.display()
                    ))
                })?
            }
        };

        // Compile before touching any store state.
        let image = skein_dsl::compile(&source_text).map_err(SkeinError::CompileError)?;
        let new_hash = image.structural_hash.clone();
        let syntactic_hash = image.syntactic_hash.clone();

        if new_hash == previous_hash {
            if canary.is_some() {
                return Err(SkeinError::Conflict(format!(
                    "source for `{name}` is unchanged; refusing to start a no-op canary"
                )));
            }
            return Ok(ReloadOutcome {
                changed: false,
                previous_hash,
                new_hash,
                version: self.versions().active_version(name),
                canary: None,
            });
        }

        self.pipelines().store(image)?;
        self.pipelines().index_syntactic(&syntactic_hash, &new_hash)?;

        match canary {
            Some(config) => {
                // Refuse before recording anything if a canary already
                // routes this name.
                if let Some(state) = self.canaries().get_state(name) {
                    if !state.status.is_terminal() {
                        return Err(SkeinError::Conflict(format!(
                            "canary already active for pipeline `{name}`"
                        )));
                    }
                }
                let old_version = self.ensure_version(name, &previous_hash)?;
                let new_version =
                    self.versions()
                        .record_version(name, &new_hash, Some(source_text))?;
                let state = self.start_canary(
                    name,
                    VersionRef {
                        version: old_version,
                        structural_hash: previous_hash.clone(),
                    },
                    VersionRef {
                        version: new_version.version,
                        structural_hash: new_hash.clone(),
                    },
                    config,
                )?;
                info!(
                    pipeline = %name,
                    old = %previous_hash,
                    new = %new_hash,
                    "reloaded under canary; alias swap deferred"
                );
                Ok(ReloadOutcome {
                    changed: true,
                    previous_hash,
                    new_hash,
                    version: Some(new_version.version),
                    canary: Some(state),
                })
            }
            None => {
                let version = self
                    .versions()
                    .record_version(name, &new_hash, Some(source_text))?;
                self.pipelines().alias(name, &new_hash)?;
                info!(pipeline = %name, old = %previous_hash, new = %new_hash, "reloaded");
                Ok(ReloadOutcome {
                    changed: true,
                    previous_hash,
                    new_hash,
                    version: Some(version.version),
                    canary: None,
                })
            }
        }
    }

    /// Version number for the current state of `name`, synthesizing the
    /// initial history entry when the name predates version tracking.
    fn ensure_version(&self, name: &str, hash: &str) -> Result<u32, SkeinError> {
        if let Some(active) = self.versions().active_version(name) {
            return Ok(active);
        }
        let recorded = self.versions().record_version(name, hash, None)?;
        Ok(recorded.version)
    }

    /// Repoint `name` at an earlier version: the explicit `v`, or the
    /// one just below the active version. An observing canary for the
    /// name is aborted first.
    pub fn rollback(&self, name: &str, v: Option<u32>) -> Result<RollbackOutcome, SkeinError> {
        let lock = self.reload_lock(name);
        let _guard = lock.lock().expect("reload lock");

        let target = match v {
            Some(v) => self.versions().get_version(name, v).ok_or_else(|| {
                SkeinError::NotFound(format!("version {v} of pipeline `{name}`"))
            })?,
            None => self.versions().previous_version(name).ok_or_else(|| {
                SkeinError::NotFound(format!("no version to roll back to for `{name}`"))
            })?,
        };

        if let Some(state) = self.canaries().get_state(name) {
            if !state.status.is_terminal() {
                self.canaries().rollback(name);
                info!(pipeline = %name, "observing canary aborted by rollback");
            }
        }

        let previous_hash = self.pipelines().resolve(name);
        self.pipelines().alias(name, &target.structural_hash)?;
        self.versions().set_active_version(name, target.version)?;
        info!(
            pipeline = %name,
            version = target.version,
            hash = %target.structural_hash,
            "rolled back"
        );
        Ok(RollbackOutcome {
            version: target.version,
            structural_hash: target.structural_hash,
            previous_hash,
        })
    }
}
