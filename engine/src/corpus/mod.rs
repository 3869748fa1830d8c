//! Policy corpus
//!
//! Reference `EvidenceCorpus` over a directory of policy documents. Documents
//! are split into paragraphs on blank lines; a query returns the paragraphs
//! sharing the most words with it, best first.

use async_trait::async_trait;
use sdk::{EngineError, EvidenceCorpus};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Default number of snippets returned per query
pub const DEFAULT_N_RESULTS: usize = 6;

/// One paragraph of a policy document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Document the paragraph came from, e.g. `dq_best_practices.md`
    pub source: String,
    pub text: String,
}

/// In-memory ranked snippet store
#[derive(Debug, Clone, Default)]
pub struct PolicyCorpus {
    snippets: Vec<Snippet>,
    n_results: usize,
}

impl PolicyCorpus {
    pub fn new(n_results: usize) -> Self {
        Self {
            snippets: Vec::new(),
            n_results: n_results.max(1),
        }
    }

    /// Load every `.md` and `.txt` document in `dir`
    ///
    /// A missing directory yields an empty corpus.
    pub fn load_dir(dir: &Path, n_results: usize) -> Result<Self, EngineError> {
        let mut corpus = Self::new(n_results);

        if !dir.exists() {
            warn!("Policy directory {:?} does not exist, corpus is empty", dir);
            return Ok(corpus);
        }

        let entries = fs::read_dir(dir)
            .map_err(|e| EngineError::Corpus(format!("Failed to read policy directory: {}", e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|ext| ext.to_str()),
                        Some("md") | Some("txt")
                    )
            })
            .collect();
        paths.sort();

        for path in paths {
            let text = fs::read_to_string(&path).map_err(|e| {
                EngineError::Corpus(format!("Failed to read policy document: {}", e))
            })?;
            let source = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("policy")
                .to_string();
            corpus.ingest(&source, &text);
        }

        debug!("Loaded {} policy snippet(s) from {:?}", corpus.len(), dir);
        Ok(corpus)
    }

    /// Add a document, split into paragraphs
    pub fn ingest(&mut self, source: &str, text: &str) {
        let normalized = text.replace("\r\n", "\n");
        for paragraph in normalized.split("\n\n") {
            let paragraph = paragraph.trim();
            if !paragraph.is_empty() {
                self.snippets.push(Snippet {
                    source: source.to_string(),
                    text: paragraph.to_string(),
                });
            }
        }
    }

    /// Builder form of `ingest`
    pub fn with_document(mut self, source: &str, text: &str) -> Self {
        self.ingest(source, text);
        self
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Top snippets for `query`, best first
    ///
    /// Ranked by the number of distinct query words a snippet contains.
    /// Ties keep document order. Repeated paragraphs are returned once.
    pub fn search(&self, query: &str) -> Vec<&Snippet> {
        let query_tokens = tokens(query);

        let mut scored: Vec<(usize, usize, &Snippet)> = self
            .snippets
            .iter()
            .enumerate()
            .map(|(position, snippet)| {
                let overlap = tokens(&snippet.text).intersection(&query_tokens).count();
                (overlap, position, snippet)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .map(|(_, _, snippet)| snippet)
            .filter(|snippet| seen.insert(snippet.text.as_str()))
            .take(self.n_results)
            .collect()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl EvidenceCorpus for PolicyCorpus {
    async fn fetch(&self, query: &str) -> Result<String, EngineError> {
        let texts: Vec<&str> = self
            .search(query)
            .into_iter()
            .map(|snippet| snippet.text.as_str())
            .collect();
        Ok(texts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Data quality\n\nRemove duplicate rows based on unique identifiers (e.g., `id`).\n\nNull values should be imputed with appropriate defaults or flagged.\r\n\r\nRemove duplicate rows based on unique identifiers (e.g., `id`).";

    #[test]
    fn test_ingest_splits_paragraphs() {
        let corpus = PolicyCorpus::new(6).with_document("dq.md", DOC);
        assert_eq!(corpus.len(), 4);
    }

    #[test]
    fn test_search_ranks_by_overlap_and_dedupes() {
        let corpus = PolicyCorpus::new(6).with_document("dq.md", DOC);
        let results = corpus.search("null values imputed");

        assert_eq!(results.len(), 3);
        assert!(results[0].text.starts_with("Null values"));
    }

    #[test]
    fn test_search_respects_n_results() {
        let corpus = PolicyCorpus::new(1).with_document("dq.md", DOC);
        assert_eq!(corpus.search("duplicate").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_fetches_empty_string() {
        let corpus = PolicyCorpus::new(6);
        assert_eq!(corpus.fetch("anything").await.unwrap(), "");
    }

    #[test]
    fn test_missing_directory_is_empty_corpus() {
        let dir = tempfile::TempDir::new().unwrap();
        let corpus = PolicyCorpus::load_dir(&dir.path().join("nope"), 6).unwrap();
        assert!(corpus.is_empty());
    }
}
