//! Request construction and response parsing for the classification oracle.

use serde::Deserialize;

use super::OracleError;
use crate::models::ClassificationResult;
use crate::taxonomy::Taxonomy;

/// Prefix of the prompt line that names the file being classified.
pub const FILE_MARKER: &str = "File: ";

const TRUNCATION_MARKER: &str = "\n...[truncated]...";
const MAX_TAG_LEN: usize = 64;

/// Cut `content` to at most `max_chars` characters.
///
/// Returns the (possibly shortened) text and whether it was cut.
pub fn truncate_content(content: &str, max_chars: usize) -> (String, bool) {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (format!("{}{}", &content[..byte_idx], TRUNCATION_MARKER), true),
        None => (content.to_string(), false),
    }
}

pub fn build_prompt(taxonomy: &Taxonomy, file_name: &str, content: &str) -> String {
    let example = taxonomy
        .categories()
        .first()
        .and_then(|c| c.subcategories.first().map(|s| (c.name.as_str(), s.as_str())))
        .unwrap_or(("category", "subcategory"));

    format!(
        "Classify the note below. Reply with a single JSON object and nothing else \
         (no Markdown fences, no commentary).\n\
         \n\
         {taxonomy}\
         \n\
         Use only the category and subcategory names listed above. Pick the subcategory \
         from the chosen category's own list. Notes that are empty, temporary, or clearly \
         finished belong in the last-resort archive-style category if one exists.\n\
         \n\
         RESPONSE FORMAT:\n\
         {{\"category\": \"{cat}\", \"subcategory\": \"{sub}\", \"title\": \"Short title\", \
         \"tags\": [\"tag-one\", \"tag-two\"], \"summary\": \"One-sentence description\"}}\n\
         \n\
         NOTE:\n\
         ---\n\
         {marker}{file}\n\
         ---\n\
         {content}",
        taxonomy = taxonomy.describe(),
        cat = example.0,
        sub = example.1,
        marker = FILE_MARKER,
        file = file_name,
        content = content,
    )
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    category: Option<String>,
    subcategory: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Parse and validate an oracle completion.
pub fn parse_response(
    text: &str,
    taxonomy: &Taxonomy,
    fallback_title: &str,
    summary_max_chars: usize,
    truncated: bool,
) -> Result<ClassificationResult, OracleError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OracleError::malformed("empty completion"));
    }

    let json = extract_json_object(text)
        .ok_or_else(|| OracleError::invalid(format!("no JSON object in response: {}", preview(text))))?;

    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|e| OracleError::invalid(format!("unparseable response: {}", e)))?;

    let category = normalize_name(raw.category)
        .ok_or_else(|| OracleError::invalid("response is missing 'category'"))?;
    let subcategory = normalize_name(raw.subcategory)
        .ok_or_else(|| OracleError::invalid("response is missing 'subcategory'"))?;

    taxonomy
        .validate(&category, &subcategory)
        .map_err(|e| OracleError::invalid(e.to_string()))?;

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    let summary = raw
        .summary
        .map(|s| clip_chars(s.trim(), summary_max_chars))
        .unwrap_or_default();

    Ok(ClassificationResult {
        category,
        subcategory,
        tags: normalize_tags(raw.tags.unwrap_or_default()),
        summary,
        title,
        truncated,
    })
}

/// Strip Markdown fences and return the outermost `{...}` span.
fn extract_json_object(text: &str) -> Option<&str> {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.trim().strip_suffix("```").unwrap_or(text).trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_lowercase()).filter(|n| !n.is_empty())
}

/// Trim, lowercase, drop a leading `#`, drop empty and oversized tags,
/// deduplicate, and sort.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().trim_start_matches('#').trim().to_lowercase())
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TAG_LEN)
        .collect();
    out.sort();
    out.dedup();
    out
}

fn clip_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

fn preview(text: &str) -> String {
    clip_chars(text, 80)
}
