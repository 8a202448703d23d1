//! Categorization pipeline orchestration.
//!
//! Drives each eligible document through
//! `discovered → pending → classifying → {succeeded, failed} → applied | skipped`,
//! checkpointing every transition.
//!
//! # Durability order
//!
//! For one document the writes happen strictly in this order:
//!
//! 1. `pending` record
//! 2. oracle call and taxonomy validation
//! 3. `pending` *intent* record carrying the result and planned output path
//! 4. merged content written to a temp file in the target directory, renamed
//!    into place, source removed
//! 5. `succeeded` record
//!
//! A crash between 4 and 5 leaves a moved file under a `pending` intent.
//! [`Pipeline::reconcile`] runs at the start of every non-dry run, finds such
//! records, checks the output tree, and completes them. An intent whose
//! target never appeared stays `pending` and is classified again.

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, PathsConfig, SourceConfig};
use crate::frontmatter;
use crate::models::{CheckpointRecord, CheckpointStatus, ClassificationResult, Document};
use crate::oracle::{self, OracleClient, OracleErrorKind};
use crate::progress::{NoProgress, ProgressEvent, ProgressMode, ProgressReporter};
use crate::source;
use crate::store::{CheckpointStore, SqliteCheckpointStore};
use crate::taxonomy::Taxonomy;

/// Flags honoured by a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Classify and validate, but write nothing (no files, no checkpoints).
    pub dry_run: bool,
    /// Process at most this many eligible documents, in key order.
    pub limit: Option<usize>,
    /// Ignore prior checkpoint statuses and process every discovered note.
    /// Records of notes already moved out of the input stay in the store.
    pub fresh: bool,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocOutcome {
    Succeeded { output_path: String },
    Failed { cause: String, message: String },
    Skipped { reason: String },
    /// Filesystem error while applying a valid result; nothing was moved.
    ApplyFailed { message: String },
    /// Dry run: where the document would have gone.
    Previewed { output_path: String },
}

impl DocOutcome {
    fn label(&self) -> String {
        match self {
            DocOutcome::Succeeded { output_path } => output_path.clone(),
            DocOutcome::Failed { cause, .. } => format!("failed ({})", cause),
            DocOutcome::Skipped { reason } => format!("skipped ({})", reason),
            DocOutcome::ApplyFailed { .. } => "apply failed".to_string(),
            DocOutcome::Previewed { output_path } => format!("[dry-run] {}", output_path),
        }
    }
}

/// Failure line in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    pub key: String,
    pub cause: String,
    pub message: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub dry_run: bool,
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Already succeeded in a prior run, or empty.
    pub skipped: usize,
    pub apply_failed: usize,
    pub previewed: usize,
    pub reconciled: usize,
    /// Interrupted moves reconciliation could not settle this run.
    pub unreconciled: usize,
    /// Per-document outcomes of this run, in completion order.
    pub outcomes: Vec<(String, DocOutcome)>,
    pub failures: Vec<ReportedFailure>,
}

impl RunReport {
    fn record(&mut self, key: &str, outcome: DocOutcome) {
        match &outcome {
            DocOutcome::Succeeded { .. } => self.succeeded += 1,
            DocOutcome::Failed { cause, message } => {
                self.failed += 1;
                self.failures.push(ReportedFailure {
                    key: key.to_string(),
                    cause: cause.clone(),
                    message: message.clone(),
                });
            }
            DocOutcome::Skipped { .. } => self.skipped += 1,
            DocOutcome::ApplyFailed { message } => {
                self.apply_failed += 1;
                self.failures.push(ReportedFailure {
                    key: key.to_string(),
                    cause: "filesystem".to_string(),
                    message: message.clone(),
                });
            }
            DocOutcome::Previewed { .. } => self.previewed += 1,
        }
        self.outcomes.push((key.to_string(), outcome));
    }

    /// Outcome recorded for `key` in this run.
    pub fn outcome(&self, key: &str) -> Option<&DocOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, o)| o)
    }

    pub fn print(&self) {
        if self.dry_run {
            println!("categorize (dry-run)");
        } else {
            println!("categorize");
        }
        println!("  discovered: {}", self.discovered);
        if self.reconciled > 0 {
            println!("  reconciled: {}", self.reconciled);
        }
        if self.unreconciled > 0 {
            println!("  unreconciled: {}", self.unreconciled);
        }
        if self.dry_run {
            println!("  would categorize: {}", self.previewed);
            for (key, outcome) in &self.outcomes {
                if let DocOutcome::Previewed { output_path } = outcome {
                    println!("    {}  ->  {}", key, output_path);
                }
            }
        } else {
            println!("  succeeded: {}", self.succeeded);
        }
        println!("  failed: {}", self.failed);
        println!("  skipped: {}", self.skipped);
        if self.apply_failed > 0 {
            println!("  apply failed: {}", self.apply_failed);
        }
        if !self.failures.is_empty() {
            println!("  failures:");
            for f in &self.failures {
                println!("    {:<40} {:<18} {}", f.key, f.cause, f.message);
            }
        }
        println!("ok");
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Interrupted moves completed and marked `succeeded`.
    pub repaired: usize,
    /// Intent records left untouched because a file could not be read or
    /// removed. They are retried by the next pass.
    pub unresolved: usize,
}

#[derive(Debug, Error)]
enum ApplyError {
    #[error("target already exists: {}", .0.display())]
    Collision(PathBuf),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// The categorization driver.
pub struct Pipeline {
    paths: PathsConfig,
    source: SourceConfig,
    taxonomy: Taxonomy,
    taxonomy_hash: String,
    concurrency: usize,
    oracle: OracleClient,
    store: Arc<dyn CheckpointStore>,
    progress: Box<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(config: &Config, oracle: OracleClient, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            paths: config.paths.clone(),
            source: config.source.clone(),
            taxonomy: config.taxonomy.clone(),
            taxonomy_hash: config.taxonomy.fingerprint(),
            concurrency: config.oracle.max_concurrency.max(1),
            oracle,
            store,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the pipeline over the input directory.
    ///
    /// Per-document failures are isolated and reported. Errors returned from
    /// here are fatal: an unreadable checkpoint store, a missing input
    /// directory, or a failed checkpoint write.
    ///
    /// The store is never cleared. `fresh` only stops succeeded keys from
    /// being skipped, so notes moved by earlier runs stay in the index.
    pub async fn run(&self, opts: &RunOptions) -> Result<RunReport> {
        let mut report = RunReport {
            dry_run: opts.dry_run,
            ..RunReport::default()
        };

        if !opts.dry_run {
            let summary = self.reconcile().await?;
            report.reconciled = summary.repaired;
            report.unreconciled = summary.unresolved;
        }

        let succeeded: HashMap<String, CheckpointRecord> = self
            .store
            .all()
            .await
            .context("checkpoint store unreadable")?
            .into_iter()
            .filter(|r| r.status == CheckpointStatus::Succeeded)
            .map(|r| (r.key.clone(), r))
            .collect();

        self.progress.report(ProgressEvent::Discovering);
        let docs = source::scan_documents(&self.paths.input_dir, &self.source)?;
        report.discovered = docs.len();

        let mut eligible = Vec::with_capacity(docs.len());
        for doc in docs {
            if !opts.fresh && succeeded.contains_key(&doc.key) {
                tracing::debug!(file = %doc.key, "already categorized, skipping");
                report.record(
                    &doc.key,
                    DocOutcome::Skipped {
                        reason: "already categorized".to_string(),
                    },
                );
            } else {
                eligible.push(doc);
            }
        }

        if let Some(limit) = opts.limit {
            eligible.truncate(limit);
        }

        let total = eligible.len() as u64;
        let mut done = 0u64;
        let succeeded = &succeeded;
        let mut in_flight = stream::iter(eligible.iter())
            .map(|doc| async move {
                let earlier = succeeded.get(&doc.key);
                (doc.key.as_str(), self.process(doc, earlier, opts.dry_run).await)
            })
            .buffer_unordered(self.concurrency);

        while let Some((key, outcome)) = in_flight.next().await {
            let outcome = outcome?;
            done += 1;
            self.progress.report(ProgressEvent::Document {
                n: done,
                total,
                key: key.to_string(),
                outcome: outcome.label(),
            });
            report.record(key, outcome);
        }

        Ok(report)
    }

    /// Process one document. `Err` only for checkpoint-store failures.
    ///
    /// `earlier` is the succeeded record a fresh run found under the same key.
    async fn process(
        &self,
        doc: &Document,
        earlier: Option<&CheckpointRecord>,
        dry_run: bool,
    ) -> Result<DocOutcome> {
        let base = CheckpointRecord::pending(&doc.key, doc.size, &self.taxonomy_hash);

        if doc.is_empty() {
            let reason = "empty document".to_string();
            if !dry_run {
                self.store
                    .put(&base.skipped("empty_document", reason.clone()))
                    .await?;
            }
            return Ok(DocOutcome::Skipped { reason });
        }

        if !dry_run {
            self.store.put(&base).await?;
        }

        let result = match self.oracle.classify(doc).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(file = %doc.key, cause = %e.kind, error = %e.message, "classification failed");
                return self
                    .fail(base, e.kind.as_str(), &e.message, dry_run)
                    .await;
            }
        };

        // Last gate before anything reaches the filesystem.
        if let Err(e) = self.taxonomy.validate(&result.category, &result.subcategory) {
            return self
                .fail(base, OracleErrorKind::InvalidResponse.as_str(), &e.to_string(), dry_run)
                .await;
        }

        let output_path = format!(
            "{}/{}/{}",
            result.category,
            result.subcategory,
            doc.file_name()
        );

        if dry_run {
            return Ok(DocOutcome::Previewed { output_path });
        }

        let intent = base.clone().intent(result.clone(), output_path.clone());
        self.store.put(&intent).await?;

        let target = self.paths.output_dir.join(&output_path);
        let processed = intent.processed.clone().unwrap_or_default();
        match apply(doc, &result, &target, &processed) {
            Ok(()) => {}
            Err(ApplyError::Collision(path)) => {
                // The target belongs to another note. Drop the planned path so
                // reconciliation never adopts it; if it is this key's earlier
                // note, restore that record so the note stays indexed.
                match earlier {
                    Some(prev) if prev.output_path.as_deref() == Some(output_path.as_str()) => {
                        self.store.put(prev).await?;
                    }
                    _ => {
                        self.store.put(&base).await?;
                    }
                }
                let message = format!("target already exists: {}", path.display());
                tracing::error!(file = %doc.key, "{}", message);
                return Ok(DocOutcome::ApplyFailed { message });
            }
            Err(ApplyError::Io(e)) => {
                let message = format!("{:#}", e);
                tracing::error!(file = %doc.key, error = %message, "failed to apply classification");
                return Ok(DocOutcome::ApplyFailed { message });
            }
        }

        self.store.put(&intent.succeeded()).await?;
        tracing::info!(file = %doc.key, to = %output_path, "categorized");

        Ok(DocOutcome::Succeeded { output_path })
    }

    async fn fail(
        &self,
        base: CheckpointRecord,
        cause: &str,
        message: &str,
        dry_run: bool,
    ) -> Result<DocOutcome> {
        if !dry_run {
            self.store.put(&base.failed(cause, message)).await?;
        }
        Ok(DocOutcome::Failed {
            cause: cause.to_string(),
            message: message.to_string(),
        })
    }

    /// Complete moves interrupted between rename and the `succeeded` write.
    ///
    /// For every `pending` record with a planned output path whose target
    /// exists and carries the recorded category/subcategory, the source is
    /// removed if still present (only when its body matches the target) and
    /// the record is marked `succeeded`.
    ///
    /// A file that cannot be read or removed affects only its own record:
    /// the error is logged, the intent is kept, and the pass moves on.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let records = self
            .store
            .all()
            .await
            .context("checkpoint store unreadable")?;

        let mut summary = ReconcileSummary::default();
        for record in records {
            if record.status != CheckpointStatus::Pending {
                continue;
            }
            let (Some(rel), Some(result)) = (record.output_path.clone(), record.result.clone())
            else {
                continue;
            };

            let target = self.paths.output_dir.join(&rel);
            if !target.exists() {
                tracing::debug!(file = %record.key, "interrupted before move; will reprocess");
                continue;
            }

            let moved = match source::read_document(&target, &rel) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::error!(file = %record.key, target = %rel, error = %format!("{:#}", e), "cannot read moved note; leaving intent in place");
                    summary.unresolved += 1;
                    continue;
                }
            };
            if !matches_classification(&moved, &result) {
                tracing::warn!(file = %record.key, target = %rel, "target does not match checkpoint; reprocessing");
                self.store
                    .put(&CheckpointRecord::pending(&record.key, record.size, &record.taxonomy_hash))
                    .await?;
                continue;
            }

            let source_path = self.paths.input_dir.join(&record.key);
            if source_path.exists() {
                let original = match source::read_document(&source_path, &record.key) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::error!(file = %record.key, error = %format!("{:#}", e), "cannot read source of interrupted move; leaving intent in place");
                        summary.unresolved += 1;
                        continue;
                    }
                };
                if original.body.trim() != moved.body.trim() {
                    tracing::warn!(file = %record.key, target = %rel, "target content differs from source; reprocessing");
                    self.store
                        .put(&CheckpointRecord::pending(&record.key, record.size, &record.taxonomy_hash))
                        .await?;
                    continue;
                }
                if let Err(e) = std::fs::remove_file(&source_path) {
                    tracing::error!(file = %record.key, error = %e, "cannot remove source of interrupted move; leaving intent in place");
                    summary.unresolved += 1;
                    continue;
                }
            }

            let stamped = moved
                .frontmatter
                .as_ref()
                .and_then(|fm| frontmatter::get_str(fm, "processed"));
            let mut done = record.succeeded();
            if stamped.is_some() {
                done.processed = stamped;
            }
            self.store.put(&done).await?;
            tracing::info!(file = %rel, "reconciled interrupted move");
            summary.repaired += 1;
        }

        Ok(summary)
    }
}

fn matches_classification(doc: &Document, result: &ClassificationResult) -> bool {
    let Some(fm) = &doc.frontmatter else {
        return false;
    };
    frontmatter::get_str(fm, "category").as_deref() == Some(result.category.as_str())
        && frontmatter::get_str(fm, "subcategory").as_deref() == Some(result.subcategory.as_str())
}

/// Write the annotated document to `target` and remove the source.
///
/// The content goes to a synced temp file in the target directory first and
/// is renamed into place, so `target` is either absent or complete.
fn apply(
    doc: &Document,
    result: &ClassificationResult,
    target: &Path,
    processed: &str,
) -> Result<(), ApplyError> {
    if target.exists() {
        return Err(ApplyError::Collision(target.to_path_buf()));
    }

    let dir = target
        .parent()
        .ok_or_else(|| anyhow::anyhow!("target has no parent: {}", target.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let merged = frontmatter::merge(doc.frontmatter.as_ref(), result, processed);
    let content = frontmatter::render(&merged, &doc.body)?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.parasort-tmp", file_name));

    let written = (|| -> Result<()> {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, target)
            .with_context(|| format!("Failed to move into {}", target.display()))?;
        Ok(())
    })();
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(ApplyError::Io(e));
    }

    std::fs::remove_file(&doc.path)
        .with_context(|| format!("Failed to remove source {}", doc.path.display()))?;

    Ok(())
}

/// `parasort categorize`: open the store, build the oracle client, run, and
/// print the summary. Refuses to start without a configured provider.
pub async fn run_categorize(
    config: &Config,
    opts: &RunOptions,
    progress: ProgressMode,
) -> Result<RunReport> {
    if !config.oracle.is_enabled() {
        bail!("oracle provider is disabled; set [oracle] provider to anthropic or ollama in config");
    }

    let store = Arc::new(SqliteCheckpointStore::open(&config.paths.checkpoint_db()).await?);
    let backend = oracle::create_backend(&config.oracle)?;
    let client = OracleClient::new(backend, config.taxonomy.clone(), &config.oracle);

    let pipeline =
        Pipeline::new(config, client, store.clone()).with_progress(progress.reporter());
    let report = pipeline.run(opts).await?;
    report.print();

    store.close().await;
    Ok(report)
}

/// `parasort reconcile`.
pub async fn run_reconcile(config: &Config) -> Result<()> {
    let store = Arc::new(SqliteCheckpointStore::open(&config.paths.checkpoint_db()).await?);
    // Reconciliation never classifies.
    let client = OracleClient::new(
        Arc::new(oracle::DisabledBackend),
        config.taxonomy.clone(),
        &config.oracle,
    );

    let summary = Pipeline::new(config, client, store.clone()).reconcile().await?;
    println!("reconcile");
    println!("  repaired: {}", summary.repaired);
    if summary.unresolved > 0 {
        println!("  unresolved: {}", summary.unresolved);
    }
    println!("ok");

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result() -> ClassificationResult {
        ClassificationResult {
            category: "areas".into(),
            subcategory: "health".into(),
            tags: vec!["sleep".into()],
            summary: "Sleep".into(),
            title: "Sleep".into(),
            truncated: false,
        }
    }

    fn doc_at(path: &Path, body: &str) -> Document {
        std::fs::write(path, body).unwrap();
        source::read_document(path, "a.md").unwrap()
    }

    #[test]
    fn apply_moves_and_annotates() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.md");
        let doc = doc_at(&src, "# Sleep\n\nEight hours.");
        let target = tmp.path().join("out/areas/health/a.md");

        apply(&doc, &result(), &target, "2026-03-01").unwrap();

        assert!(!src.exists());
        let written = std::fs::read_to_string(&target).unwrap();
        assert!(written.starts_with("---\n"));
        assert!(written.contains("category: areas"));
        assert!(written.contains("processed: 2026-03-01"));
        assert!(written.ends_with("# Sleep\n\nEight hours."));
        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn apply_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.md");
        let doc = doc_at(&src, "body");
        let target = tmp.path().join("out/areas/health/a.md");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "someone else").unwrap();

        let err = apply(&doc, &result(), &target, "2026-03-01").unwrap_err();
        assert!(matches!(err, ApplyError::Collision(_)));
        assert!(src.exists());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "someone else");
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = RunReport::default();
        report.record("a.md", DocOutcome::Succeeded { output_path: "areas/health/a.md".into() });
        report.record(
            "b.md",
            DocOutcome::Failed { cause: "network".into(), message: "timeout".into() },
        );
        report.record("c.md", DocOutcome::Skipped { reason: "empty document".into() });
        report.record("d.md", DocOutcome::ApplyFailed { message: "denied".into() });

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.apply_failed, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[1].cause, "filesystem");
        assert!(matches!(report.outcome("c.md"), Some(DocOutcome::Skipped { .. })));
    }
}
