//! Scripted completion backend for tests.
//!
//! Responses are keyed by the file name embedded in the prompt (the
//! `File: <name>` line), so tests can script each document independently and
//! assert how many times the oracle was consulted for it.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{CompletionBackend, OracleError, FILE_MARKER};

type Scripted = Result<String, OracleError>;

#[derive(Default)]
struct Script {
    /// Consumed front to back; the last entry repeats once the queue drains.
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
}

/// A [`CompletionBackend`] that replays canned responses and records calls.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    default_response: Mutex<Option<Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `text` for `file`.
    pub fn respond(&self, file: &str, text: &str) {
        self.respond_sequence(file, vec![Ok(text.to_string())]);
    }

    /// Answer `file` with each entry in turn, repeating the last one.
    pub fn respond_sequence(&self, file: &str, responses: Vec<Scripted>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(
                file.to_string(),
                Script {
                    queue: responses.into(),
                    last: None,
                },
            );
        }
    }

    /// Answer for files with no script of their own.
    pub fn respond_default(&self, response: Scripted) {
        if let Ok(mut default) = self.default_response.lock() {
            *default = Some(response);
        }
    }

    /// Total number of `complete` calls.
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Number of `complete` calls whose prompt named `file`.
    pub fn calls_for(&self, file: &str) -> usize {
        self.prompts
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|prompt| file_in_prompt(prompt) == Some(file))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn file_in_prompt(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(FILE_MARKER))
        .map(str::trim)
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let file = file_in_prompt(prompt).unwrap_or_default().to_string();

        let scripted = self.scripts.lock().ok().and_then(|mut scripts| {
            let script = scripts.get_mut(&file)?;
            match script.queue.pop_front() {
                Some(next) => {
                    script.last = Some(next.clone());
                    Some(next)
                }
                None => script.last.clone(),
            }
        });

        match scripted {
            Some(response) => response,
            None => self
                .default_response
                .lock()
                .ok()
                .and_then(|d| d.clone())
                .unwrap_or_else(|| Err(OracleError::unknown(format!("no script for '{}'", file)))),
        }
    }
}
