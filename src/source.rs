//! Document source: enumerates markdown notes under the input directory.
//!
//! Walks the tree, applies include/exclude globs, reads each file, and splits
//! off any existing frontmatter. Output is sorted by key so that `--limit N`
//! always selects the same first N documents for the same input set.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::frontmatter;
use crate::models::Document;

pub fn scan_documents(root: &Path, settings: &SourceConfig) -> Result<Vec<Document>> {
    if !root.exists() {
        bail!("Input directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&settings.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(settings.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(root).follow_links(settings.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let key = relative_key(relative);

        if exclude_set.is_match(&key) {
            continue;
        }
        if !include_set.is_match(&key) {
            continue;
        }

        match read_document(path, &key) {
            Ok(doc) => docs.push(doc),
            Err(e) => tracing::warn!(file = %key, error = %format!("{:#}", e), "skipping unreadable file"),
        }
    }

    docs.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(docs)
}

/// Read one file into a [`Document`].
pub fn read_document(path: &Path, key: &str) -> Result<Document> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let size = content.len() as u64;

    let (frontmatter, body) = match frontmatter::split(&content) {
        Ok((fm, body)) => (fm, body.to_string()),
        Err(e) => {
            tracing::warn!(file = %key, error = %e, "ignoring malformed frontmatter");
            (None, content.clone())
        }
    };

    Ok(Document {
        key: key.to_string(),
        path: path.to_path_buf(),
        frontmatter,
        body,
        size,
    })
}

/// `/`-separated relative path, independent of platform separators.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scans_sorted_markdown_only() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("b.md"), "B").unwrap();
        fs::write(root.join("a.md"), "A").unwrap();
        fs::write(root.join("sub/c.md"), "C").unwrap();
        fs::write(root.join("image.png"), "not markdown").unwrap();

        let docs = scan_documents(root, &SourceConfig::default()).unwrap();
        let keys: Vec<&str> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a.md", "b.md", "sub/c.md"]);
    }

    #[test]
    fn excludes_apply() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("keep.md"), "k").unwrap();
        fs::write(root.join("drafts/skip.md"), "s").unwrap();

        let settings = SourceConfig {
            exclude_globs: vec!["drafts/**".into()],
            ..SourceConfig::default()
        };
        let docs = scan_documents(root, &settings).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "keep.md");
    }

    #[test]
    fn reads_existing_frontmatter() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        fs::write(&path, "---\nsource: evernote\n---\nHello").unwrap();

        let doc = read_document(&path, "note.md").unwrap();
        assert_eq!(doc.body, "Hello");
        assert_eq!(doc.stem(), "note");
        let fm = doc.frontmatter.unwrap();
        assert_eq!(
            crate::frontmatter::get_str(&fm, "source").as_deref(),
            Some("evernote")
        );
    }

    #[test]
    fn malformed_frontmatter_kept_as_body() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.md");
        fs::write(&path, "---\n- just\n- a list\n---\nText").unwrap();

        let doc = read_document(&path, "bad.md").unwrap();
        assert!(doc.frontmatter.is_none());
        assert!(doc.body.starts_with("---"));
    }

    #[test]
    fn missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_documents(&tmp.path().join("nope"), &SourceConfig::default()).is_err());
    }
}
