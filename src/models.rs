//! Core data models used throughout parasort.
//!
//! These types represent the documents, classification results, checkpoint
//! records, and index entries that flow through the categorization pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A markdown note read from the input directory.
///
/// Identified by its relative path (`key`, always `/`-separated). Immutable
/// once read for a given run.
#[derive(Debug, Clone)]
pub struct Document {
    pub key: String,
    pub path: PathBuf,
    /// Pre-existing frontmatter mapping, if the file carried one.
    pub frontmatter: Option<serde_yaml::Mapping>,
    /// Content after the frontmatter block.
    pub body: String,
    pub size: u64,
}

impl Document {
    /// File name without the `.md` extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.key.clone())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.key.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Validated output of the classification oracle for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub subcategory: String,
    /// Deduplicated and sorted.
    pub tags: Vec<String>,
    pub summary: String,
    pub title: String,
    /// True when the content sent to the oracle was cut to fit its input budget.
    #[serde(default)]
    pub truncated: bool,
}

/// Processing status of a checkpointed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Succeeded,
    Failed,
    Skipped,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Succeeded => "succeeded",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckpointStatus::Pending),
            "succeeded" => Some(CheckpointStatus::Succeeded),
            "failed" => Some(CheckpointStatus::Failed),
            "skipped" => Some(CheckpointStatus::Skipped),
            _ => None,
        }
    }
}

/// Recorded cause of a failed or skipped document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// `rate_limited`, `invalid_response`, `network`, `unknown`, or `empty_document`.
    pub cause: String,
    pub message: String,
}

/// Durable per-document outcome, keyed by the document's relative input path.
///
/// `seq` is assigned by the store on every `put` and grows monotonically in
/// processing order; a later `put` for the same key supersedes the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub key: String,
    pub status: CheckpointStatus,
    pub result: Option<ClassificationResult>,
    pub error: Option<FailureDetail>,
    /// Path relative to the output directory. On a `pending` record this is
    /// the planned destination of an in-flight move.
    pub output_path: Option<String>,
    pub size: u64,
    pub taxonomy_hash: String,
    /// `YYYY-MM-DD` stamped into the note's frontmatter when it was applied.
    pub processed: Option<String>,
    pub seq: u64,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn pending(key: &str, size: u64, taxonomy_hash: &str) -> Self {
        Self {
            key: key.to_string(),
            status: CheckpointStatus::Pending,
            result: None,
            error: None,
            output_path: None,
            size,
            taxonomy_hash: taxonomy_hash.to_string(),
            processed: None,
            seq: 0,
            updated_at: Utc::now(),
        }
    }

    /// Pending record carrying the validated result and planned destination.
    ///
    /// Stamps today's local date as the `processed` date the apply step will
    /// write into the note.
    pub fn intent(mut self, result: ClassificationResult, output_path: String) -> Self {
        self.status = CheckpointStatus::Pending;
        self.result = Some(result);
        self.output_path = Some(output_path);
        self.processed = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
        self.error = None;
        self.updated_at = Utc::now();
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.status = CheckpointStatus::Succeeded;
        self.error = None;
        self.updated_at = Utc::now();
        self
    }

    pub fn failed(mut self, cause: &str, message: impl Into<String>) -> Self {
        self.status = CheckpointStatus::Failed;
        self.result = None;
        self.output_path = None;
        self.processed = None;
        self.error = Some(FailureDetail {
            cause: cause.to_string(),
            message: message.into(),
        });
        self.updated_at = Utc::now();
        self
    }

    pub fn skipped(mut self, cause: &str, message: impl Into<String>) -> Self {
        self.status = CheckpointStatus::Skipped;
        self.result = None;
        self.output_path = None;
        self.processed = None;
        self.error = Some(FailureDetail {
            cause: cause.to_string(),
            message: message.into(),
        });
        self.updated_at = Utc::now();
        self
    }
}

/// One successfully categorized document in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file: String,
    /// Path relative to the output directory.
    pub path: String,
    pub category: String,
    pub subcategory: String,
    pub title: String,
    pub tags: Vec<String>,
    pub summary: String,
    /// `YYYY-MM-DD`.
    pub processed: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            CheckpointStatus::Pending,
            CheckpointStatus::Succeeded,
            CheckpointStatus::Failed,
            CheckpointStatus::Skipped,
        ] {
            assert_eq!(CheckpointStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CheckpointStatus::parse("done"), None);
    }

    #[test]
    fn failed_clears_result_and_destination() {
        let result = ClassificationResult {
            category: "areas".into(),
            subcategory: "health".into(),
            tags: vec![],
            summary: String::new(),
            title: "A".into(),
            truncated: false,
        };
        let record = CheckpointRecord::pending("a.md", 10, "h")
            .intent(result, "areas/health/a.md".into())
            .failed("network", "boom");
        assert_eq!(record.status, CheckpointStatus::Failed);
        assert!(record.result.is_none());
        assert!(record.output_path.is_none());
        assert_eq!(record.error.unwrap().cause, "network");
    }
}
