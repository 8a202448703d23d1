//! YAML frontmatter splitting, merging, and rendering.
//!
//! A frontmatter block is a YAML mapping fenced by `---` lines at the very
//! start of a file. Classification owns a fixed set of keys
//! ([`OWNED_KEYS`]); merging overwrites those and keeps every other
//! pre-existing key in its original position.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

use crate::models::ClassificationResult;

/// Keys written by classification.
pub const OWNED_KEYS: [&str; 6] = [
    "title",
    "category",
    "subcategory",
    "tags",
    "summary",
    "processed",
];

/// Split `content` into its raw frontmatter text and body.
///
/// Returns `None` for the frontmatter when the file does not open with a
/// `---` fence or the fence is never closed.
pub fn split_raw(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    // Closing fence on its own line; an empty block closes immediately.
    let (yaml, after) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        match rest.find("\n---") {
            Some(idx) => (&rest[..idx], &rest[idx + 4..]),
            None => return (None, content),
        }
    };

    // The fence line may only carry trailing whitespace.
    let (fence_tail, body) = match after.find('\n') {
        Some(nl) => (&after[..nl], &after[nl + 1..]),
        None => (after, ""),
    };
    if !fence_tail.trim().is_empty() {
        return (None, content);
    }

    (Some(yaml), body)
}

/// Split and parse the frontmatter into a YAML mapping.
///
/// An empty block yields an empty mapping. A block that is not a mapping
/// is an error so the caller can decide how to treat the file.
pub fn split(content: &str) -> Result<(Option<Mapping>, &str)> {
    match split_raw(content) {
        (None, body) => Ok((None, body)),
        (Some(yaml), body) => {
            if yaml.trim().is_empty() {
                return Ok((Some(Mapping::new()), body));
            }
            let value: Value =
                serde_yaml::from_str(yaml).context("frontmatter is not valid YAML")?;
            match value {
                Value::Mapping(map) => Ok((Some(map), body)),
                Value::Null => Ok((Some(Mapping::new()), body)),
                _ => anyhow::bail!("frontmatter is not a YAML mapping"),
            }
        }
    }
}

/// Merge classification output into an existing mapping.
pub fn merge(
    existing: Option<&Mapping>,
    result: &ClassificationResult,
    processed: &str,
) -> Mapping {
    let mut map = existing.cloned().unwrap_or_default();

    let tags: Vec<Value> = result
        .tags
        .iter()
        .map(|t| Value::String(t.clone()))
        .collect();

    let owned: [(&str, Value); 6] = [
        ("title", Value::String(result.title.clone())),
        ("category", Value::String(result.category.clone())),
        ("subcategory", Value::String(result.subcategory.clone())),
        ("tags", Value::Sequence(tags)),
        ("summary", Value::String(result.summary.clone())),
        ("processed", Value::String(processed.to_string())),
    ];
    for (key, value) in owned {
        map.insert(Value::String(key.to_string()), value);
    }
    map
}

/// Render a frontmatter block followed by the body.
pub fn render(map: &Mapping, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(map).context("failed to serialize frontmatter")?;
    let body = body.trim_start_matches(['\n', '\r']);
    Ok(format!("---\n{}---\n\n{}", yaml, body))
}

/// Read a string-valued key.
pub fn get_str(map: &Mapping, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a tag list. Accepts a YAML sequence, a JSON-encoded list string, or
/// a single bare string.
pub fn get_tags(map: &Mapping) -> Vec<String> {
    match map.get("tags") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => serde_json::from_str::<Vec<String>>(s)
            .unwrap_or_else(|_| vec![s.clone()])
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ClassificationResult {
        ClassificationResult {
            category: "areas".into(),
            subcategory: "health".into(),
            tags: vec!["fitness".into(), "sleep".into()],
            summary: "Sleep routine".into(),
            title: "Sleep".into(),
            truncated: false,
        }
    }

    #[test]
    fn split_without_frontmatter() {
        let (fm, body) = split("# Title\n\nText").unwrap();
        assert!(fm.is_none());
        assert_eq!(body, "# Title\n\nText");
    }

    #[test]
    fn split_with_frontmatter() {
        let (fm, body) = split("---\nauthor: me\nrating: 3\n---\n# Title\n").unwrap();
        let fm = fm.unwrap();
        assert_eq!(get_str(&fm, "author").as_deref(), Some("me"));
        assert_eq!(get_str(&fm, "rating").as_deref(), Some("3"));
        assert_eq!(body, "# Title\n");
    }

    #[test]
    fn unclosed_fence_is_body() {
        let content = "---\nauthor: me\n# no closing fence";
        let (fm, body) = split(content).unwrap();
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn horizontal_rule_is_not_frontmatter() {
        let content = "Intro\n---\nMore";
        let (fm, _) = split(content).unwrap();
        assert!(fm.is_none());
    }

    #[test]
    fn invalid_yaml_is_error() {
        assert!(split("---\n: : [\n---\nbody").is_err());
        assert!(split("---\n- a\n- b\n---\nbody").is_err());
    }

    #[test]
    fn merge_preserves_foreign_keys_and_overwrites_owned() {
        let (fm, _) = split("---\nauthor: me\ncategory: inbox\n---\nbody").unwrap();
        let merged = merge(fm.as_ref(), &result(), "2026-01-02");

        assert_eq!(get_str(&merged, "author").as_deref(), Some("me"));
        assert_eq!(get_str(&merged, "category").as_deref(), Some("areas"));
        assert_eq!(get_str(&merged, "processed").as_deref(), Some("2026-01-02"));
        assert_eq!(get_tags(&merged), vec!["fitness", "sleep"]);

        // Pre-existing keys keep their position.
        let keys: Vec<&str> = merged.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys[0], "author");
        assert_eq!(keys[1], "category");
    }

    #[test]
    fn render_then_split_keeps_body() {
        let merged = merge(None, &result(), "2026-01-02");
        let text = render(&merged, "\n\n# Sleep\n\nNotes").unwrap();
        assert!(text.starts_with("---\n"));
        let (fm, body) = split(&text).unwrap();
        assert_eq!(get_str(&fm.unwrap(), "subcategory").as_deref(), Some("health"));
        assert_eq!(body, "\n# Sleep\n\nNotes");
    }

    #[test]
    fn tags_from_json_string() {
        let (fm, _) = split("---\ntags: '[\"a\", \"b\"]'\n---\n").unwrap();
        assert_eq!(get_tags(&fm.unwrap()), vec!["a", "b"]);
    }
}
