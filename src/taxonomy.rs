//! The PARA taxonomy: top-level categories and their valid subcategories.
//!
//! A [`Taxonomy`] is built once from configuration at startup and never
//! mutated afterwards. Every classification result is checked against it
//! with [`Taxonomy::validate`] before anything touches the filesystem.
//!
//! Category and subcategory names double as directory names under the
//! output tree, so construction rejects anything that is not a lowercase
//! slug.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A top-level category and its allowed subcategories, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub subcategories: Vec<String>,
}

/// Raw `[taxonomy]` config section before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyConfig {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown subcategory '{subcategory}' for category '{category}'")]
    UnknownSubcategory {
        category: String,
        subcategory: String,
    },
}

/// Validated, immutable category → subcategory mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TaxonomyConfig")]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl TryFrom<TaxonomyConfig> for Taxonomy {
    type Error = anyhow::Error;

    fn try_from(raw: TaxonomyConfig) -> anyhow::Result<Self> {
        Taxonomy::new(raw.categories)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::para()
    }
}

impl Taxonomy {
    pub fn new(categories: Vec<Category>) -> anyhow::Result<Self> {
        if categories.is_empty() {
            anyhow::bail!("taxonomy must define at least one category");
        }
        let mut seen = std::collections::HashSet::new();
        for cat in &categories {
            check_slug(&cat.name)?;
            if !seen.insert(cat.name.as_str()) {
                anyhow::bail!("taxonomy: duplicate category '{}'", cat.name);
            }
            if cat.subcategories.is_empty() {
                anyhow::bail!("taxonomy: category '{}' has no subcategories", cat.name);
            }
            let mut subs = std::collections::HashSet::new();
            for sub in &cat.subcategories {
                check_slug(sub)?;
                if !subs.insert(sub.as_str()) {
                    anyhow::bail!(
                        "taxonomy: duplicate subcategory '{}' in '{}'",
                        sub,
                        cat.name
                    );
                }
            }
        }
        Ok(Self { categories })
    }

    /// The built-in Areas / Resources / Archive taxonomy.
    pub fn para() -> Self {
        let cat = |name: &str, description: &str, subs: &[&str]| Category {
            name: name.to_string(),
            description: Some(description.to_string()),
            subcategories: subs.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            categories: vec![
                cat(
                    "areas",
                    "ongoing responsibilities you maintain over time",
                    &["health", "finance", "career", "family"],
                ),
                cat(
                    "resources",
                    "reference material and accumulated knowledge",
                    &["data-science", "programming", "business", "personal-dev"],
                ),
                cat(
                    "archive",
                    "finished, stale, or throwaway notes",
                    &["old-projects", "completed", "outdated"],
                ),
            ],
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Position of a category in declaration order, for stable sorting.
    pub fn rank(&self, category: &str) -> usize {
        self.categories
            .iter()
            .position(|c| c.name == category)
            .unwrap_or(self.categories.len())
    }

    /// Check that `subcategory ∈ taxonomy[category]`.
    pub fn validate(&self, category: &str, subcategory: &str) -> Result<(), TaxonomyError> {
        let cat = self
            .category(category)
            .ok_or_else(|| TaxonomyError::UnknownCategory(category.to_string()))?;
        if cat.subcategories.iter().any(|s| s == subcategory) {
            Ok(())
        } else {
            Err(TaxonomyError::UnknownSubcategory {
                category: category.to_string(),
                subcategory: subcategory.to_string(),
            })
        }
    }

    /// Prompt fragment listing categories and their allowed subcategories.
    pub fn describe(&self) -> String {
        let mut out = String::from("CATEGORIES:\n");
        for cat in &self.categories {
            match &cat.description {
                Some(desc) => out.push_str(&format!("- {}: {}\n", cat.name, desc)),
                None => out.push_str(&format!("- {}\n", cat.name)),
            }
        }
        out.push_str("\nSUBCATEGORIES:\n");
        for cat in &self.categories {
            out.push_str(&format!(
                "{} -> {}\n",
                cat.name,
                cat.subcategories.join(" | ")
            ));
        }
        out
    }

    /// SHA-256 over the canonical category/subcategory listing.
    ///
    /// Stored on every checkpoint record so the taxonomy a record was
    /// validated against can be told apart from the current one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for cat in &self.categories {
            hasher.update(cat.name.as_bytes());
            hasher.update(b":");
            for sub in &cat.subcategories {
                hasher.update(sub.as_bytes());
                hasher.update(b",");
            }
            hasher.update(b";");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn check_slug(name: &str) -> anyhow::Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        anyhow::bail!(
            "taxonomy: '{}' is not a valid name (use lowercase letters, digits, '-' or '_')",
            name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn para_accepts_known_pairs() {
        let tax = Taxonomy::para();
        assert!(tax.validate("areas", "health").is_ok());
        assert!(tax.validate("resources", "programming").is_ok());
        assert!(tax.validate("archive", "outdated").is_ok());
    }

    #[test]
    fn rejects_subcategory_from_other_category() {
        let tax = Taxonomy::para();
        assert_eq!(
            tax.validate("areas", "programming"),
            Err(TaxonomyError::UnknownSubcategory {
                category: "areas".into(),
                subcategory: "programming".into()
            })
        );
        assert_eq!(
            tax.validate("projects", "health"),
            Err(TaxonomyError::UnknownCategory("projects".into()))
        );
    }

    #[test]
    fn rejects_path_unsafe_names() {
        let bad = vec![Category {
            name: "../etc".into(),
            description: None,
            subcategories: vec!["x".into()],
        }];
        assert!(Taxonomy::new(bad).is_err());

        let spaced = vec![Category {
            name: "areas".into(),
            description: None,
            subcategories: vec!["my notes".into()],
        }];
        assert!(Taxonomy::new(spaced).is_err());
    }

    #[test]
    fn rejects_empty_category() {
        let empty = vec![Category {
            name: "areas".into(),
            description: None,
            subcategories: vec![],
        }];
        assert!(Taxonomy::new(empty).is_err());
        assert!(Taxonomy::new(vec![]).is_err());
    }

    #[test]
    fn fingerprint_changes_with_subcategories() {
        let a = Taxonomy::para();
        let mut cats = a.categories().to_vec();
        cats[0].subcategories.push("hobbies".into());
        let b = Taxonomy::new(cats).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), Taxonomy::para().fingerprint());
    }

    #[test]
    fn describe_lists_every_subcategory() {
        let text = Taxonomy::para().describe();
        assert!(text.contains("areas -> health | finance | career | family"));
        assert!(text.contains("archive -> old-projects | completed | outdated"));
    }

    #[test]
    fn deserializes_from_toml() {
        let tax: Taxonomy = toml::from_str(
            r#"
            [[categories]]
            name = "areas"
            subcategories = ["health"]
            "#,
        )
        .unwrap();
        assert_eq!(tax.rank("areas"), 0);
        assert_eq!(tax.rank("missing"), 1);
    }
}
