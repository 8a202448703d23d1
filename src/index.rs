//! Index and statistics over the categorized corpus.
//!
//! The index is a pure replay of `succeeded` checkpoint records: the oracle
//! is never called and note content is never read. A rescan mode rebuilds
//! the same entries from the frontmatter of files in the output tree, for
//! trees categorized by another tool or after the checkpoint store was
//! discarded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::frontmatter;
use crate::models::{CheckpointRecord, CheckpointStatus, IndexEntry};
use crate::store::{CheckpointStore, SqliteCheckpointStore};
use crate::taxonomy::Taxonomy;

const TOP_TAGS_IN_STATS: usize = 50;

/// Ordered aggregate of [`IndexEntry`] records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesIndex {
    pub total: usize,
    pub notes: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesStats {
    pub total: usize,
    pub total_size_mb: f64,
    pub by_category: BTreeMap<String, usize>,
    /// Keyed `category/subcategory`.
    pub by_subcategory: BTreeMap<String, usize>,
    /// Most used tags, by count descending then name.
    pub by_tag: Vec<TagCount>,
}

/// Build the index from checkpoint records.
///
/// Only `succeeded` records with a result and an output path contribute.
/// Records validated against an older taxonomy are kept as they are.
pub fn build_index(records: &[CheckpointRecord], taxonomy: &Taxonomy) -> NotesIndex {
    let mut notes: Vec<IndexEntry> = records
        .iter()
        .filter(|r| r.status == CheckpointStatus::Succeeded)
        .filter_map(|r| {
            let result = r.result.as_ref()?;
            let path = r.output_path.as_ref()?;
            Some(IndexEntry {
                file: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: path.clone(),
                category: result.category.clone(),
                subcategory: result.subcategory.clone(),
                title: result.title.clone(),
                tags: result.tags.clone(),
                summary: result.summary.clone(),
                processed: r.processed.clone().unwrap_or_else(|| {
                    r.updated_at.format("%Y-%m-%d").to_string()
                }),
                size: r.size,
            })
        })
        .collect();

    sort_entries(&mut notes, taxonomy);
    NotesIndex {
        total: notes.len(),
        notes,
    }
}

fn sort_entries(notes: &mut [IndexEntry], taxonomy: &Taxonomy) {
    notes.sort_by(|a, b| {
        taxonomy
            .rank(&a.category)
            .cmp(&taxonomy.rank(&b.category))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.subcategory.cmp(&b.subcategory))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Aggregate counts over index entries.
pub fn build_stats(notes: &[IndexEntry]) -> NotesStats {
    let mut by_category = BTreeMap::new();
    let mut by_subcategory = BTreeMap::new();
    let mut tags: HashMap<&str, usize> = HashMap::new();
    let mut total_size = 0u64;

    for note in notes {
        total_size += note.size;
        *by_category.entry(note.category.clone()).or_insert(0) += 1;
        *by_subcategory
            .entry(format!("{}/{}", note.category, note.subcategory))
            .or_insert(0) += 1;
        for tag in note.tags.iter().filter(|t| !t.is_empty()) {
            *tags.entry(tag.as_str()).or_insert(0) += 1;
        }
    }

    NotesStats {
        total: notes.len(),
        total_size_mb: total_size as f64 / (1024.0 * 1024.0),
        by_category,
        by_subcategory,
        by_tag: top_tags(tags, TOP_TAGS_IN_STATS),
    }
}

pub(crate) fn top_tags(counts: HashMap<&str, usize>, limit: usize) -> Vec<TagCount> {
    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(limit);
    ranked
}

/// Rebuild index entries from the frontmatter of categorized files.
///
/// Category and subcategory come from the first two path components under
/// `output_dir`; the hub directory and hidden files are ignored.
pub fn scan_output_tree(
    output_dir: &Path,
    moc_dir_name: &str,
    taxonomy: &Taxonomy,
) -> Result<Vec<IndexEntry>> {
    let mut notes = Vec::new();
    if !output_dir.exists() {
        return Ok(notes);
    }

    let walker = WalkDir::new(output_dir).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0 || !(name.starts_with('.') || (e.depth() == 1 && name == moc_dir_name))
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", output_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let rel = path.strip_prefix(output_dir).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read note");
                continue;
            }
        };
        let fm = match frontmatter::split(&content) {
            Ok((fm, _)) => fm.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "unreadable frontmatter");
                Default::default()
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        notes.push(IndexEntry {
            file: parts.last().cloned().unwrap_or_default(),
            path: parts.join("/"),
            category: if parts.len() > 1 { parts[0].clone() } else { "unknown".into() },
            subcategory: if parts.len() > 2 { parts[1].clone() } else { "unknown".into() },
            title: frontmatter::get_str(&fm, "title").unwrap_or(stem),
            tags: frontmatter::get_tags(&fm),
            summary: frontmatter::get_str(&fm, "summary").unwrap_or_default(),
            processed: frontmatter::get_str(&fm, "processed").unwrap_or_default(),
            size: content.len() as u64,
        });
    }

    sort_entries(&mut notes, taxonomy);
    Ok(notes)
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load_index(path: &Path) -> Result<NotesIndex> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Index not found: {} (run `parasort index` first)", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse index: {}", path.display()))
}

pub fn print_stats(stats: &NotesStats) {
    println!("Notes");
    println!("=====");
    println!();
    println!("  Total notes: {}", stats.total);
    println!("  Total size:  {:.1} MB", stats.total_size_mb);

    println!();
    println!("  By category:");
    for (cat, count) in &stats.by_category {
        println!("    {:<28} {:>6}", cat, count);
    }

    let mut subs: Vec<(&String, &usize)> = stats.by_subcategory.iter().collect();
    subs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    println!();
    println!("  By subcategory:");
    for (sub, count) in subs {
        println!("    {:<28} {:>6}", sub, count);
    }

    if !stats.by_tag.is_empty() {
        println!();
        println!("  Top tags:");
        for (i, t) in stats.by_tag.iter().take(20).enumerate() {
            println!("    {:>2}. {:<24} {:>6}", i + 1, t.tag, t.count);
        }
    }
    println!();
}

/// `parasort index [--stats] [--rescan]`.
pub async fn run_index(config: &Config, stats_only: bool, rescan: bool) -> Result<()> {
    let notes = if rescan {
        scan_output_tree(
            &config.paths.output_dir,
            &config.moc.dir_name,
            &config.taxonomy,
        )?
    } else {
        let store = SqliteCheckpointStore::open(&config.paths.checkpoint_db()).await?;
        let records = store.all().await.context("checkpoint store unreadable")?;
        store.close().await;
        build_index(&records, &config.taxonomy).notes
    };

    println!("Found {} notes", notes.len());
    if notes.is_empty() {
        println!("Nothing categorized yet. Run `parasort categorize` first.");
        return Ok(());
    }

    let stats = build_stats(&notes);
    if !stats_only {
        let index = NotesIndex {
            total: notes.len(),
            notes,
        };
        save_json(&config.paths.index_file(), &index)?;
        save_json(&config.paths.stats_file(), &stats)?;
        println!("Index saved: {}", config.paths.index_file().display());
        println!("Statistics:  {}", config.paths.stats_file().display());
        println!();
    }
    print_stats(&stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassificationResult;
    use tempfile::TempDir;

    fn succeeded(key: &str, cat: &str, sub: &str, tags: &[&str]) -> CheckpointRecord {
        let result = ClassificationResult {
            category: cat.into(),
            subcategory: sub.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            summary: format!("about {}", key),
            title: key.trim_end_matches(".md").to_uppercase(),
            truncated: false,
        };
        let path = format!("{}/{}/{}", cat, sub, key);
        CheckpointRecord::pending(key, 1024, "h")
            .intent(result, path)
            .succeeded()
    }

    #[test]
    fn index_contains_only_succeeded_in_taxonomy_order() {
        let records = vec![
            succeeded("c.md", "archive", "outdated", &[]),
            succeeded("b.md", "resources", "programming", &["rust"]),
            CheckpointRecord::pending("d.md", 5, "h").failed("invalid_response", "bad"),
            succeeded("a.md", "areas", "health", &["sleep", "rust"]),
            CheckpointRecord::pending("e.md", 5, "h"),
        ];
        let index = build_index(&records, &Taxonomy::para());

        assert_eq!(index.total, 3);
        let paths: Vec<&str> = index.notes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "areas/health/a.md",
                "resources/programming/b.md",
                "archive/outdated/c.md"
            ]
        );
        assert_eq!(index.notes[0].file, "a.md");
        assert_eq!(index.notes[0].title, "A");
        assert_eq!(index.notes[0].processed.len(), 10);
    }

    #[test]
    fn processed_date_comes_from_the_record() {
        let mut record = succeeded("a.md", "areas", "health", &[]);
        record.processed = Some("2026-03-14".into());
        record.updated_at = chrono::DateTime::from_timestamp(1_900_000_000, 0).unwrap();

        let index = build_index(&[record], &Taxonomy::para());
        assert_eq!(index.notes[0].processed, "2026-03-14");
    }

    #[test]
    fn pending_intent_is_not_indexed() {
        let result = ClassificationResult {
            category: "areas".into(),
            subcategory: "health".into(),
            tags: vec![],
            summary: String::new(),
            title: "x".into(),
            truncated: false,
        };
        let records =
            vec![CheckpointRecord::pending("x.md", 1, "h").intent(result, "areas/health/x.md".into())];
        assert_eq!(build_index(&records, &Taxonomy::para()).total, 0);
    }

    #[test]
    fn stats_count_categories_and_tags() {
        let records = vec![
            succeeded("a.md", "areas", "health", &["sleep", "rust"]),
            succeeded("b.md", "resources", "programming", &["rust"]),
            succeeded("c.md", "resources", "programming", &["tokio"]),
        ];
        let index = build_index(&records, &Taxonomy::para());
        let stats = build_stats(&index.notes);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category["resources"], 2);
        assert_eq!(stats.by_subcategory["resources/programming"], 2);
        assert_eq!(stats.by_tag[0], TagCount { tag: "rust".into(), count: 2 });
        assert_eq!(stats.by_tag[1].tag, "sleep");
        assert!((stats.total_size_mb - 3.0 * 1024.0 / (1024.0 * 1024.0)).abs() < 1e-9);
    }

    #[test]
    fn rescan_reads_frontmatter_and_skips_hubs() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        std::fs::create_dir_all(out.join("areas/health")).unwrap();
        std::fs::create_dir_all(out.join("_MOC")).unwrap();
        std::fs::write(
            out.join("areas/health/sleep.md"),
            "---\ntitle: Sleep\ntags:\n- rest\nsummary: Notes on sleep\nprocessed: 2026-01-02\n---\n\nbody",
        )
        .unwrap();
        std::fs::write(out.join("areas/health/.sleep.md.parasort-tmp"), "partial").unwrap();
        std::fs::write(out.join("_MOC/_MOC-index.md"), "# MOC").unwrap();

        let notes = scan_output_tree(out, "_MOC", &Taxonomy::para()).unwrap();
        assert_eq!(notes.len(), 1);
        let n = &notes[0];
        assert_eq!(n.path, "areas/health/sleep.md");
        assert_eq!(n.category, "areas");
        assert_eq!(n.subcategory, "health");
        assert_eq!(n.title, "Sleep");
        assert_eq!(n.tags, vec!["rest"]);
        assert_eq!(n.processed, "2026-01-02");
    }

    #[test]
    fn saved_index_loads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/notes_index.json");
        let index = build_index(
            &[succeeded("a.md", "areas", "health", &["x"])],
            &Taxonomy::para(),
        );
        save_json(&path, &index).unwrap();
        assert_eq!(load_index(&path).unwrap(), index);
    }
}
