//! # parasort
//!
//! Resumable classification of markdown notes into a PARA taxonomy.
//!
//! parasort sends each note to an external completion service (the
//! *oracle*), validates the structured answer against a fixed taxonomy,
//! writes the result into the note's frontmatter, and moves the note to
//! `output/<category>/<subcategory>/`. Every step is checkpointed so an
//! interrupted run resumes where it stopped without classifying anything
//! twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  Source  │──▶│   Pipeline   │◀─▶│   Oracle   │
//! │ input/*  │   │ apply + move │   │  (LLM API) │
//! └──────────┘   └──────┬───────┘   └────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐   ┌─────────┐   ┌─────────┐
//!                │ Checkpoints │──▶│  Index  │──▶│   MOC   │
//!                │  (SQLite)   │   │  JSON   │   │  hubs   │
//!                └─────────────┘   └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! parasort init                     # create data dir + checkpoint store
//! parasort categorize --limit 10    # classify the first ten notes
//! parasort index                    # write notes_index.json
//! parasort moc                      # write output/_MOC/*.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`taxonomy`] | Category/subcategory validation |
//! | [`models`] | Core data types |
//! | [`source`] | Input document discovery |
//! | [`frontmatter`] | YAML frontmatter split/merge/render |
//! | [`oracle`] | Completion backends, retry, response validation |
//! | [`store`] | Checkpoint store trait and implementations |
//! | [`pipeline`] | Run orchestration and crash reconciliation |
//! | [`index`] | Index and statistics |
//! | [`moc`] | Map-of-Content hub generation |
//! | [`status`] | Checkpoint overview |
//! | [`progress`] | Run progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod frontmatter;
pub mod index;
pub mod migrate;
pub mod moc;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod status;
pub mod store;
pub mod taxonomy;
