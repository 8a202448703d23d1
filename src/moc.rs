//! Map of Content (hub document) generation.
//!
//! [`generate`] is a pure function of the [`NotesIndex`]: the same index
//! always yields byte-identical hubs. Each hub's "Updated" line is the latest
//! `processed` date among the notes it lists, not the wall clock.
//!
//! | File | Contents |
//! |------|----------|
//! | `_MOC-index.md` | categories with their subcategory hubs, popular tags |
//! | `_MOC-<category>.md` | one section per subcategory |
//! | `_MOC-<category>-<subcategory>.md` | notes by title with summary, top tags |
//! | `_MOC-tag-<tag>.md` | notes carrying a popular tag, by category |

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};

use crate::config::{Config, MocConfig};
use crate::index::{self, top_tags, NotesIndex};
use crate::models::IndexEntry;
use crate::taxonomy::Taxonomy;

const PREVIEW_CHARS: usize = 500;
const TOP_TAGS_PER_SUBCATEGORY: usize = 10;

/// One generated hub file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubDocument {
    pub file_name: String,
    pub content: String,
}

pub fn index_hub_name() -> String {
    "_MOC-index.md".to_string()
}

pub fn category_hub_name(category: &str) -> String {
    format!("_MOC-{}.md", category)
}

pub fn subcategory_hub_name(category: &str, subcategory: &str) -> String {
    format!("_MOC-{}-{}.md", category, subcategory)
}

pub fn tag_hub_name(tag: &str) -> String {
    format!("_MOC-tag-{}.md", slug(tag))
}

/// File names for every tag that gets its own hub.
///
/// Tags are visited in name order; when two tags reduce to the same slug
/// (`c++` and `c#`), the later one gets a numeric suffix.
fn tag_hub_names<'a>(
    tag_ranking: &'a [index::TagCount],
    settings: &MocConfig,
) -> HashMap<&'a str, String> {
    let mut eligible: Vec<&str> = tag_ranking
        .iter()
        .filter(|t| t.count >= settings.min_notes_for_tag_moc && !slug(&t.tag).is_empty())
        .map(|t| t.tag.as_str())
        .collect();
    eligible.sort_unstable();

    let mut taken: HashMap<String, &str> = HashMap::new();
    let mut names = HashMap::new();
    for tag in eligible {
        let mut name = tag_hub_name(tag);
        let mut n = 2;
        while let Some(owner) = taken.get(&name) {
            tracing::warn!(tag = %tag, other = %owner, file = %name, "tag hub name already used");
            name = format!("_MOC-tag-{}-{}.md", slug(tag), n);
            n += 1;
        }
        taken.insert(name.clone(), tag);
        names.insert(tag, name);
    }
    names
}

/// Reduce a tag to a file-name-safe form.
fn slug(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for c in tag.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn title_case(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn link(note: &IndexEntry) -> String {
    format!("../{}", note.path.replace(' ', "%20"))
}

fn header(lines: &mut Vec<String>, title: &str, meta: &[String], notes: &[&IndexEntry]) {
    lines.push(format!("# MOC: {}", title));
    lines.push(String::new());
    for m in meta {
        lines.push(format!("> {}", m));
    }
    if let Some(updated) = notes
        .iter()
        .map(|n| n.processed.as_str())
        .filter(|p| !p.is_empty())
        .max()
    {
        lines.push(format!("> Updated: {}", updated));
    }
    lines.push(String::new());
}

fn by_title<'a>(notes: &[&'a IndexEntry]) -> Vec<&'a IndexEntry> {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.path.cmp(&b.path)));
    sorted
}

fn tag_counts<'a>(notes: &[&'a IndexEntry]) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for note in notes {
        for tag in note.tags.iter().filter(|t| !t.is_empty()) {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

/// Categories present in the index, in taxonomy order; unknown ones last.
fn ordered_categories<'a>(
    groups: &BTreeMap<&'a str, BTreeMap<&'a str, Vec<&'a IndexEntry>>>,
    taxonomy: &Taxonomy,
) -> Vec<&'a str> {
    let mut cats: Vec<&str> = groups.keys().copied().collect();
    cats.sort_by(|a, b| taxonomy.rank(a).cmp(&taxonomy.rank(b)).then_with(|| a.cmp(b)));
    cats
}

/// Build every hub for `index`.
pub fn generate(index: &NotesIndex, taxonomy: &Taxonomy, settings: &MocConfig) -> Vec<HubDocument> {
    let mut groups: BTreeMap<&str, BTreeMap<&str, Vec<&IndexEntry>>> = BTreeMap::new();
    for note in &index.notes {
        groups
            .entry(note.category.as_str())
            .or_default()
            .entry(note.subcategory.as_str())
            .or_default()
            .push(note);
    }
    let categories = ordered_categories(&groups, taxonomy);

    let all: Vec<&IndexEntry> = index.notes.iter().collect();
    let tag_ranking = top_tags(tag_counts(&all), usize::MAX);
    let tag_files = tag_hub_names(&tag_ranking, settings);

    let mut hubs = Vec::new();
    hubs.push(HubDocument {
        file_name: index_hub_name(),
        content: main_hub(&groups, &categories, &all, &tag_ranking, &tag_files, settings),
    });

    for cat in &categories {
        let subs = &groups[cat];
        hubs.push(HubDocument {
            file_name: category_hub_name(cat),
            content: category_hub(cat, subs),
        });
        for (sub, notes) in subs {
            hubs.push(HubDocument {
                file_name: subcategory_hub_name(cat, sub),
                content: subcategory_hub(cat, sub, notes),
            });
        }
    }

    let mut tag_hubs: BTreeMap<&str, HubDocument> = BTreeMap::new();
    for t in &tag_ranking {
        let Some(file_name) = tag_files.get(t.tag.as_str()) else {
            continue;
        };
        let notes: Vec<&IndexEntry> = all
            .iter()
            .copied()
            .filter(|n| n.tags.iter().any(|x| x == &t.tag))
            .collect();
        tag_hubs.insert(
            file_name.as_str(),
            HubDocument {
                file_name: file_name.clone(),
                content: tag_hub(&t.tag, &notes, taxonomy),
            },
        );
    }
    hubs.extend(tag_hubs.into_values());

    hubs
}

fn main_hub(
    groups: &BTreeMap<&str, BTreeMap<&str, Vec<&IndexEntry>>>,
    categories: &[&str],
    all: &[&IndexEntry],
    tag_ranking: &[index::TagCount],
    tag_files: &HashMap<&str, String>,
    settings: &MocConfig,
) -> String {
    let mut lines = Vec::new();
    header(
        &mut lines,
        "Main Index",
        &[format!("Total notes: {}", all.len())],
        all,
    );
    lines.push("## By Category".to_string());
    lines.push(String::new());

    for cat in categories {
        let subs = &groups[cat];
        let count: usize = subs.values().map(|n| n.len()).sum();
        lines.push(format!(
            "### [{}](./{}) ({} notes)",
            title_case(cat),
            category_hub_name(cat),
            count
        ));
        lines.push(String::new());
        for (sub, notes) in subs {
            lines.push(format!(
                "- [{}](./{}) ({} notes)",
                sub,
                subcategory_hub_name(cat, sub),
                notes.len()
            ));
        }
        lines.push(String::new());
    }

    if !tag_ranking.is_empty() {
        lines.push("## Popular Tags".to_string());
        lines.push(String::new());
        for t in tag_ranking.iter().take(settings.top_tags) {
            if let Some(file_name) = tag_files.get(t.tag.as_str()) {
                lines.push(format!("- [#{}](./{}) ({})", t.tag, file_name, t.count));
            } else {
                lines.push(format!("- #{} ({})", t.tag, t.count));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn category_hub(category: &str, subs: &BTreeMap<&str, Vec<&IndexEntry>>) -> String {
    let all: Vec<&IndexEntry> = subs.values().flatten().copied().collect();
    let mut lines = Vec::new();
    header(
        &mut lines,
        &title_case(category),
        &[format!("Notes: {}", all.len())],
        &all,
    );

    lines.push("## Subcategories".to_string());
    lines.push(String::new());
    for (sub, notes) in subs {
        lines.push(format!(
            "- [{}](./{}) ({} notes)",
            title_case(sub),
            subcategory_hub_name(category, sub),
            notes.len()
        ));
    }
    lines.push(String::new());

    for (sub, notes) in subs {
        lines.push(format!("## {}", title_case(sub)));
        lines.push(String::new());
        for note in by_title(notes) {
            lines.push(format!("- [{}]({})", note.title, link(note)));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn subcategory_hub(category: &str, subcategory: &str, notes: &[&IndexEntry]) -> String {
    let mut lines = Vec::new();
    header(
        &mut lines,
        &title_case(subcategory),
        &[
            format!("Category: [{}](./{})", category, category_hub_name(category)),
            format!("Notes: {}", notes.len()),
        ],
        notes,
    );

    lines.push("## Notes".to_string());
    lines.push(String::new());
    for note in by_title(notes) {
        if note.summary.is_empty() {
            lines.push(format!("- [{}]({})", note.title, link(note)));
        } else {
            lines.push(format!("- [{}]({}) - {}", note.title, link(note), note.summary));
        }
    }
    lines.push(String::new());

    let tags = top_tags(tag_counts(notes), TOP_TAGS_PER_SUBCATEGORY);
    if !tags.is_empty() {
        lines.push("## Popular Tags".to_string());
        lines.push(String::new());
        for t in tags {
            lines.push(format!("- #{} ({})", t.tag, t.count));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn tag_hub(tag: &str, notes: &[&IndexEntry], taxonomy: &Taxonomy) -> String {
    let mut lines = Vec::new();
    header(
        &mut lines,
        &format!("#{}", tag),
        &[format!("Notes: {}", notes.len())],
        notes,
    );
    lines.push("## Notes".to_string());
    lines.push(String::new());

    let mut by_category: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();
    for note in notes {
        by_category.entry(note.category.as_str()).or_default().push(note);
    }
    let mut cats: Vec<&str> = by_category.keys().copied().collect();
    cats.sort_by(|a, b| taxonomy.rank(a).cmp(&taxonomy.rank(b)).then_with(|| a.cmp(b)));

    for cat in cats {
        lines.push(format!("### {}", title_case(cat)));
        lines.push(String::new());
        for note in by_title(&by_category[cat]) {
            lines.push(format!("- [{}]({})", note.title, link(note)));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

/// `parasort moc [--preview]`.
pub fn run_moc(config: &Config, preview_only: bool) -> Result<()> {
    let index = index::load_index(&config.paths.index_file())?;
    println!("Loaded {} notes", index.notes.len());
    if index.notes.is_empty() {
        println!("No notes in index. Run `parasort categorize` and `parasort index` first.");
        return Ok(());
    }

    let hubs = generate(&index, &config.taxonomy, &config.moc);
    let moc_dir = config.paths.output_dir.join(&config.moc.dir_name);

    if preview_only {
        for hub in &hubs {
            println!();
            println!("{}", "=".repeat(50));
            println!("FILE: {}", hub.file_name);
            println!("{}", "=".repeat(50));
            println!("{}", preview(&hub.content));
        }
        return Ok(());
    }

    std::fs::create_dir_all(&moc_dir)
        .with_context(|| format!("Failed to create {}", moc_dir.display()))?;
    for hub in &hubs {
        let path = moc_dir.join(&hub.file_name);
        std::fs::write(&path, &hub.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  Created: {}", hub.file_name);
    }
    println!("MOC files written to {}", moc_dir.display());
    Ok(())
}
