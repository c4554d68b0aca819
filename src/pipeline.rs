//! Deployment pipeline step
//!
//! For each feature flag file:
//! 1. Read and validate the local document
//! 2. Lock and load the merge base
//! 3. Merge, validate and hash
//! 4. Decide whether to publish
//! 5. Persist the merged document as the next merge base
//!
//! Configurations are independent; batch runs process them one at a time and
//! keep going when one fails.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flagmerge_document::ConfigDocument;
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::detect::{self, ConfigLifecycle, DeployedState};
use crate::engine::{MergeEngine, MergeOptions};
use crate::error::PipelineError;
use crate::report::{
    BatchEntry, BatchFailure, BatchSummary, MergeReport, MERGE_REPORT_SCHEMA_ID, SCHEMA_VERSION,
};
use crate::store::{is_artifact_path, FileStore, MergeBaseStore};

/// Deployment coordinates of a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTarget {
    /// AppConfig application / configuration name
    pub configuration: String,
    pub environment: String,
    /// Configuration profile name
    pub profile: String,
}

/// One configuration to merge
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub target: ConfigTarget,
    pub source: PathBuf,
    pub force_create: bool,
    /// Last published version, as reported by the provisioning layer
    pub deployed: Option<DeployedState>,
}

impl MergeRequest {
    /// Store key: the source file stem
    pub fn store_key(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// A directory of configurations to merge
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub dir: PathBuf,
    pub environment: String,
    pub profile: String,
    pub force_create: bool,
    /// Directory holding `<configuration>.json` deployed states
    pub deployed_state_dir: Option<PathBuf>,
}

/// Merges and evaluates configurations for one pipeline run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    run_id: String,
    settings: Settings,
    engine: MergeEngine,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        let engine = MergeEngine::new(MergeOptions {
            deletion: settings.deletion.policy,
            removal_marker: settings.deletion.marker.clone(),
        });
        Self {
            run_id: ulid::Ulid::new().to_string().to_lowercase(),
            settings,
            engine,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process a configuration against its sibling merge artifact.
    pub fn run_file(&self, request: &MergeRequest) -> Result<MergeReport, PipelineError> {
        let (mut store, _) = FileStore::beside(
            &request.source,
            self.settings.artifact_suffix.clone(),
            self.settings.lock_timeout(),
        )?;
        self.run_one(&mut store, request)
    }

    /// Process a configuration against an arbitrary store.
    ///
    /// Nothing is written unless the merge succeeds.
    pub fn run_one<S: MergeBaseStore>(
        &self,
        store: &mut S,
        request: &MergeRequest,
    ) -> Result<MergeReport, PipelineError> {
        let span = info_span!("configuration", name = %request.target.configuration);
        let _enter = span.enter();

        let local = read_source(&request.source)?;
        let key = request.store_key();

        let _lock = store.lock(&key)?;
        let previous = store.get(&key)?;
        if previous.is_none() && request.force_create {
            info!("no merge artifact, force-creating from {}", request.source.display());
        }

        let deployed = request.deployed.as_ref();
        let mut lifecycle = ConfigLifecycle::new(deployed);

        let merged = self
            .engine
            .merge(&local, previous.as_ref(), request.force_create)?;
        lifecycle.merged()?;

        let decision = detect::decide(&merged.content_hash, deployed);
        store.put(&key, &merged.document)?;
        lifecycle.resolve(decision)?;

        info!(
            hash = %merged.content_hash,
            decision = decision.as_str(),
            reason = decision.reason(),
            "configuration merged"
        );

        Ok(MergeReport {
            schema_version: SCHEMA_VERSION,
            schema_id: MERGE_REPORT_SCHEMA_ID.to_string(),
            run_id: self.run_id.clone(),
            created_at: Utc::now(),
            configuration: request.target.configuration.clone(),
            environment: request.target.environment.clone(),
            profile: request.target.profile.clone(),
            source: request.source.to_string_lossy().to_string(),
            artifact: store
                .location(&key)
                .map(|p| p.to_string_lossy().to_string()),
            flag_count: merged.document.flag_count(),
            value_count: merged.document.value_count(),
            content_hash: merged.content_hash,
            base: merged.base,
            decision,
            previous_state: lifecycle.initial,
            state: lifecycle.state,
            deletion_policy: self.engine.options().deletion,
            removed: merged.removed,
            dropped: merged.dropped,
        })
    }

    /// Find feature flag files under `dir`.
    ///
    /// Returns `(configuration name, path)` pairs sorted by path. The
    /// configuration name is the path relative to `dir` without extension.
    pub fn discover_sources(
        &self,
        dir: &Path,
        skip_dir: Option<&Path>,
    ) -> Result<Vec<(String, PathBuf)>, PipelineError> {
        let include = self.settings.include_set()?;
        let exclude = self.settings.exclude_set()?;
        let suffix = &self.settings.artifact_suffix;

        // Compare the skipped directory relative to `dir`, so `./flags/state`
        // and `flags/state` are treated alike.
        let skip_relative = skip_dir.and_then(|skip| {
            let root = fs::canonicalize(dir).ok()?;
            let skip = fs::canonicalize(skip).ok()?;
            skip.strip_prefix(&root).ok().map(Path::to_path_buf)
        });

        let mut sources = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|source| PipelineError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();

            if !entry.file_type().is_file() || is_artifact_path(path, suffix) {
                continue;
            }
            let relative = path.strip_prefix(dir).unwrap_or(path);
            if skip_relative
                .as_ref()
                .is_some_and(|skip| !skip.as_os_str().is_empty() && relative.starts_with(skip))
            {
                continue;
            }
            if !include.is_match(relative) || exclude.is_match(relative) {
                debug!(path = %relative.display(), "not selected");
                continue;
            }

            let name = relative
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");
            sources.push((name, path.to_path_buf()));
        }

        Ok(sources)
    }

    /// Process every configuration in a directory, best-effort.
    pub fn run_batch(&self, request: &BatchRequest) -> Result<BatchSummary, PipelineError> {
        let sources = self.discover_sources(&request.dir, request.deployed_state_dir.as_deref())?;
        info!(count = sources.len(), dir = %request.dir.display(), "batch started");

        let mut entries = Vec::with_capacity(sources.len());
        for (name, source) in sources {
            let outcome = self
                .load_deployed(request.deployed_state_dir.as_deref(), &name)
                .and_then(|deployed| {
                    self.run_file(&MergeRequest {
                        target: ConfigTarget {
                            configuration: name.clone(),
                            environment: request.environment.clone(),
                            profile: request.profile.clone(),
                        },
                        source: source.clone(),
                        force_create: request.force_create,
                        deployed,
                    })
                });

            let (report, error) = match outcome {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!(configuration = %name, kind = ?e.kind(), "{}", e);
                    (
                        None,
                        Some(BatchFailure {
                            kind: e.kind(),
                            message: e.to_string(),
                        }),
                    )
                }
            };

            entries.push(BatchEntry {
                configuration: name,
                source: source.to_string_lossy().to_string(),
                report,
                error,
            });
        }

        let summary = BatchSummary::new(
            &self.run_id,
            request.dir.to_string_lossy().to_string(),
            entries,
        );
        info!(
            total = summary.total,
            published = summary.published,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }

    fn load_deployed(
        &self,
        dir: Option<&Path>,
        name: &str,
    ) -> Result<Option<DeployedState>, PipelineError> {
        let Some(dir) = dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{}.json", name));
        if !path.exists() {
            debug!(path = %path.display(), "no deployed state recorded");
            return Ok(None);
        }
        DeployedState::from_file(&path)
            .map(Some)
            .map_err(|source| PipelineError::DeployedState { path, source })
    }
}

/// Read and validate a feature flag document from disk
pub fn read_source(path: &Path) -> Result<ConfigDocument, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::ReadSource {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigDocument::from_slice(&bytes).map_err(|source| PipelineError::MalformedSource {
        path: path.to_path_buf(),
        source,
    })
}
