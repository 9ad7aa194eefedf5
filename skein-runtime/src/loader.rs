//! Bulk loading: scan a directory for `.skein` sources, compile each,
//! store the images, and assign aliases per strategy. Sources already
//! known by syntactic hash are skipped, so repeated boots against the
//! same directory are cheap and never duplicate version state.

use crate::registry::Registry;
use skein_core::config::AliasStrategy;
use skein_core::error::SkeinError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub recursive: bool,
    pub fail_on_error: bool,
    pub alias_strategy: AliasStrategy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            fail_on_error: false,
            alias_strategy: AliasStrategy::FileName,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl Registry {
    /// Load every pipeline source under `dir`.
    ///
    /// With `fail_on_error` the collected errors are raised as one
    /// aggregate failure; otherwise they are reported in the result and
    /// loading continues past them.
    pub fn load_directory(
        &self,
        dir: &Path,
        options: &LoadOptions,
    ) -> Result<LoadReport, SkeinError> {
        if !dir.exists() {
            return Err(SkeinError::NotFound(format!(
                "load directory {} does not exist",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            return Err(SkeinError::InvalidInput(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut report = LoadReport::default();
        let mut run_aliases: HashSet<String> = HashSet::new();

        for path in discover_sources(dir, options.recursive)? {
            self.load_one(dir, &path, options, &mut run_aliases, &mut report);
        }

        info!(
            dir = %dir.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            failed = report.failed,
            "bulk load finished"
        );

        if options.fail_on_error && !report.errors.is_empty() {
            return Err(SkeinError::InvalidInput(format!(
                "bulk load failed for {} file(s): {}",
                report.errors.len(),
                report.errors.join("; ")
            )));
        }
        Ok(report)
    }

    fn load_one(
        &self,
        base: &Path,
        path: &Path,
        options: &LoadOptions,
        run_aliases: &mut HashSet<String>,
        report: &mut LoadReport,
    ) {
        let fail = |report: &mut LoadReport, message: String| {
            warn!(path = %path.display(), "{message}");
            report.failed += 1;
            report.errors.push(message);
        };

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                fail(report, format!("{}: read failed: {e}", path.display()));
                return;
            }
        };
        let source = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                fail(
                    report,
                    format!("{}: not valid UTF-8: {e}", path.display()),
                );
                return;
            }
        };

        // Known source text: nothing to compile, nothing to alias.
        let syntactic = skein_dsl::syntactic_hash(&source);
        if self.pipelines().lookup_syntactic(&syntactic).is_some() {
            report.skipped += 1;
            return;
        }

        let alias = match alias_for(base, path, options.alias_strategy) {
            Ok(alias) => alias,
            Err(message) => {
                fail(report, format!("{}: {message}", path.display()));
                return;
            }
        };

        if let Some(alias) = &alias {
            if run_aliases.contains(alias) {
                fail(
                    report,
                    format!("{}: alias `{alias}` already assigned in this load", path.display()),
                );
                return;
            }
            if options.alias_strategy == AliasStrategy::FileName
                && self.pipelines().resolve(alias).is_some()
            {
                fail(
                    report,
                    format!("{}: alias `{alias}` already exists in the store", path.display()),
                );
                return;
            }
        }

        let summary = match self.compile_and_store(&source, alias.as_deref()) {
            Ok(s) => s,
            Err(SkeinError::CompileError(diags)) => {
                let first = diags
                    .first()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown error".into());
                fail(
                    report,
                    format!("{}: compile failed ({} error(s); first: {first})", path.display(), diags.len()),
                );
                return;
            }
            Err(e) => {
                fail(report, format!("{}: {e}", path.display()));
                return;
            }
        };

        if let Some(alias) = alias {
            run_aliases.insert(alias.clone());
            self.remember_source_path(&alias, path.to_path_buf());
        }
        info!(path = %path.display(), hash = %summary.structural_hash, "pipeline loaded");
        report.loaded += 1;
    }
}

/// All `.skein` files under `dir`, sorted for deterministic load order.
fn discover_sources(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, SkeinError> {
    let pattern = if recursive {
        format!("{}/**/*.{}", dir.display(), skein_dsl::SOURCE_EXTENSION)
    } else {
        format!("{}/*.{}", dir.display(), skein_dsl::SOURCE_EXTENSION)
    };
    let paths = glob::glob(&pattern)
        .map_err(|e| SkeinError::InvalidInput(format!("bad scan pattern: {e}")))?;

    let mut sources: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => sources.push(path),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "unreadable path during scan, skipping"),
        }
    }
    sources.sort();
    Ok(sources)
}

fn alias_for(
    base: &Path,
    path: &Path,
    strategy: AliasStrategy,
) -> Result<Option<String>, String> {
    match strategy {
        AliasStrategy::HashOnly => Ok(None),
        AliasStrategy::FileName => {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| "file name is not valid UTF-8".to_string())?;
            Ok(Some(stem.to_string()))
        }
        AliasStrategy::RelativePath => {
            let relative = path
                .strip_prefix(base)
                .map_err(|_| "file escapes the base directory".to_string())?;
            let no_ext = relative.with_extension("");
            let parts: Vec<&str> = no_ext
                .components()
                .map(|c| c.as_os_str().to_str().ok_or("path is not valid UTF-8"))
                .collect::<Result<_, _>>()?;
            Ok(Some(parts.join("/")))
        }
    }
}
