//! Best-effort knowledge-base retrieval.
//!
//! Searches a JSONL corpus (one `{id, title, contents}` object per line) by
//! normalized token overlap, freshly per call. Retrieval is a quality
//! enhancement, never a correctness dependency: every internal failure
//! degrades to an empty result set with a log line.

use std::collections::HashSet;
use std::path::PathBuf;

use careline_core::config::RetrievalConfig;
use serde::Deserialize;
use tracing::{error, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub contents: String,
    pub score: f32,
}

#[derive(Debug, Deserialize)]
struct KbRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    contents: Option<String>,
}

pub struct Retriever {
    enabled: bool,
    kb_path: PathBuf,
}

impl Retriever {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self { enabled: config.enabled, kb_path: config.kb_path.clone() }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Top-`k` documents for `query`, best first. Empty on any failure.
    pub async fn search(&self, query: &str, k: usize) -> Vec<Document> {
        let corpus = match tokio::fs::read_to_string(&self.kb_path).await {
            Ok(corpus) => corpus,
            Err(io_error) => {
                error!(
                    event_name = "agent.retrieval.corpus_unreadable",
                    path = %self.kb_path.display(),
                    error = %io_error,
                    "knowledge-base search failed; returning no context"
                );
                return Vec::new();
            }
        };

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut documents: Vec<Document> = corpus
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let record = match serde_json::from_str::<KbRecord>(line) {
                    Ok(record) => record,
                    Err(parse_error) => {
                        warn!(
                            event_name = "agent.retrieval.record_skipped",
                            error = %parse_error,
                            "skipping malformed knowledge-base line"
                        );
                        return None;
                    }
                };
                let contents = match record.contents {
                    Some(contents) => contents,
                    None => {
                        warn!(
                            event_name = "agent.retrieval.record_skipped",
                            id = %record.id,
                            "skipping knowledge-base record without contents"
                        );
                        return None;
                    }
                };

                let score = overlap_score(&query_tokens, &contents, &record.title);
                (score > 0.0).then_some(Document {
                    id: record.id,
                    title: record.title,
                    contents,
                    score,
                })
            })
            .collect();

        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        documents.truncate(k);
        documents
    }

    /// Renders documents as the bullet list injected into the system prompt.
    pub fn context_block(documents: &[Document]) -> String {
        documents
            .iter()
            .map(|document| format!("- {}", document.contents))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_ascii_lowercase())
        .collect()
}

fn overlap_score(query_tokens: &HashSet<String>, contents: &str, title: &str) -> f32 {
    let document_tokens = tokenize(&format!("{title} {contents}"));
    if document_tokens.is_empty() {
        return 0.0;
    }

    let matched = query_tokens.intersection(&document_tokens).count();
    matched as f32 / query_tokens.len() as f32
}
