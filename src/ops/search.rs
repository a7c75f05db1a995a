use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::config::RetrievalConfig;
use crate::model::document::DocumentRecord;
use crate::ops::embed::{EmbeddingBackend, cosine};
use crate::store::{DocumentQuery, IndexStore, StoreError};
use crate::util::unicode::truncate_to_width;

/// Minimum lexical candidates fetched before blending
const LEXICAL_POOL: usize = 200;
const SNIPPET_WIDTH: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Vector,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn parse_mode(s: &str) -> Option<SearchMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "fts" | "keyword" => Some(SearchMode::Lexical),
            "vector" | "semantic" => Some(SearchMode::Vector),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

/// Ranking knobs for one search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub lexical_weight: f32,
    pub vector_weight: f32,
    /// Scores halve every this many days of document age
    pub recency_half_life_days: Option<f64>,
    /// Hits scoring below this are dropped before ranking
    pub min_score: Option<f32>,
    pub limit: usize,
    /// Reference date for document age
    pub today: NaiveDate,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions::from_config(&RetrievalConfig::default())
    }
}

impl SearchOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        SearchOptions {
            mode: SearchMode::Hybrid,
            lexical_weight: config.lexical_weight,
            vector_weight: config.vector_weight,
            recency_half_life_days: config.recency_half_life_days,
            min_score: config.min_score,
            limit: config.limit,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_weights(mut self, lexical: f32, vector: f32) -> Self {
        self.lexical_weight = lexical;
        self.vector_weight = vector;
        self
    }

    pub fn with_recency(mut self, half_life_days: f64) -> Self {
        self.recency_half_life_days = Some(half_life_days);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: DocumentRecord,
    /// Final score after blending and recency
    pub score: f32,
    /// Normalized lexical score, when the document matched lexically
    pub lexical: Option<f32>,
    /// Clamped cosine similarity, when the document has an embedding
    pub vector: Option<f32>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// The mode that actually ran
    pub mode: SearchMode,
    /// Vector retrieval was requested but unavailable
    pub degraded: bool,
}

/// Blended lexical and vector retrieval over the index
pub struct Retriever<'a> {
    store: &'a IndexStore,
    backend: Option<&'a dyn EmbeddingBackend>,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Retriever {
            store,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: &'a dyn EmbeddingBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    #[tracing::instrument(skip(self, filters, opts), fields(mode = opts.mode.as_str()))]
    pub fn search(
        &self,
        query: &str,
        filters: &DocumentQuery,
        opts: &SearchOptions,
    ) -> Result<SearchResults, StoreError> {
        let mut mode = opts.mode;
        let mut degraded = false;

        let vector = match mode {
            SearchMode::Lexical => HashMap::new(),
            SearchMode::Vector | SearchMode::Hybrid => match self.vector_scores(query, filters)? {
                Some(scores) => scores,
                None => {
                    degraded = true;
                    mode = SearchMode::Lexical;
                    HashMap::new()
                }
            },
        };
        let lexical = match mode {
            SearchMode::Vector => HashMap::new(),
            SearchMode::Lexical | SearchMode::Hybrid => self.lexical_scores(query, filters, opts.limit)?,
        };

        let mut ids: Vec<i64> = lexical.keys().chain(vector.keys()).copied().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut hits = Vec::new();
        for id in ids {
            let lex = lexical.get(&id).copied();
            let vec = vector.get(&id).copied();
            let base = match mode {
                SearchMode::Lexical => lex.unwrap_or(0.0),
                SearchMode::Vector => vec.unwrap_or(0.0),
                SearchMode::Hybrid => {
                    opts.lexical_weight * lex.unwrap_or(0.0) + opts.vector_weight * vec.unwrap_or(0.0)
                }
            };
            let Some(document) = self.store.document(id)? else {
                continue;
            };
            let score = match opts.recency_half_life_days {
                Some(half_life) => base * recency_multiplier(&document, opts.today, half_life),
                None => base,
            };
            if opts.min_score.is_some_and(|min| score < min) {
                continue;
            }
            let content = self.store.document_content(id)?.unwrap_or_default();
            hits.push(SearchHit {
                snippet: snippet(&content, query),
                document,
                score,
                lexical: lex,
                vector: vec,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(opts.limit);
        debug!(hits = hits.len(), degraded, "search finished");
        Ok(SearchResults {
            hits,
            mode,
            degraded,
        })
    }

    /// FTS relevance normalized so the best hit scores 1
    fn lexical_scores(
        &self,
        query: &str,
        filters: &DocumentQuery,
        limit: usize,
    ) -> Result<HashMap<i64, f32>, StoreError> {
        let raw = self
            .store
            .fts_search(query, filters, LEXICAL_POOL.max(limit * 4))?;
        let best = raw.first().map(|(_, r)| *r).unwrap_or(0.0);
        Ok(raw
            .into_iter()
            .map(|(id, r)| {
                let score = if best > 0.0 { (r / best).clamp(0.0, 1.0) } else { 1.0 };
                (id, score as f32)
            })
            .collect())
    }

    /// Cosine similarity against every candidate with a current embedding.
    /// `None` when no backend is configured or the backend fails.
    fn vector_scores(
        &self,
        query: &str,
        filters: &DocumentQuery,
    ) -> Result<Option<HashMap<i64, f32>>, StoreError> {
        let Some(backend) = self.backend else {
            warn!("no embedding backend configured; falling back to lexical search");
            return Ok(None);
        };
        let query_vec = match backend.embed(&[query]) {
            Ok(mut v) if v.len() == 1 => v.remove(0),
            Ok(v) => {
                warn!(got = v.len(), "embedding backend returned the wrong number of vectors");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "embedding backend failed; falling back to lexical search");
                return Ok(None);
            }
        };
        let scores = self
            .store
            .embeddings_for(filters, backend.model_id())?
            .into_iter()
            .map(|(id, v)| (id, cosine(&query_vec, &v).clamp(0.0, 1.0)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        Ok(Some(scores))
    }
}

/// `0.5^(age / half_life)`, with age from the document date or its
/// modification day. Future dates count as age zero.
pub fn recency_multiplier(doc: &DocumentRecord, today: NaiveDate, half_life_days: f64) -> f32 {
    let date = doc.date.or_else(|| {
        DateTime::from_timestamp(
            doc.mtime_ns.div_euclid(1_000_000_000),
            doc.mtime_ns.rem_euclid(1_000_000_000) as u32,
        )
        .map(|dt| dt.date_naive())
    });
    let Some(date) = date else {
        return 1.0;
    };
    let age = (today - date).num_days().max(0) as f64;
    if half_life_days <= 0.0 {
        return 1.0;
    }
    0.5f64.powf(age / half_life_days) as f32
}

/// First line mentioning a query term, else the first non-empty line
fn snippet(content: &str, query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.clone().next().unwrap_or("");
    let line = lines
        .find(|l| {
            let lower = l.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .unwrap_or(first);
    truncate_to_width(line, SNIPPET_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::embed::{BackendError, HashingEmbedder};
    use crate::store::documents::tests::index_text;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn titles(results: &SearchResults) -> Vec<&str> {
        results.hits.iter().map(|h| h.document.title.as_str()).collect()
    }

    fn embed_all(store: &IndexStore, backend: &dyn EmbeddingBackend) {
        for job in store.documents_missing_embeddings(backend.model_id()).unwrap() {
            let v = backend.embed(&[job.text.as_str()]).unwrap().remove(0);
            store
                .store_embedding(job.document_id, backend.model_id(), &v, &job.content_hash)
                .unwrap();
        }
    }

    /// Scores documents by a fixed table, keyed by the document's first word
    struct Fixed(Vec<(&'static str, Vec<f32>)>);

    impl EmbeddingBackend for Fixed {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.0
                        .iter()
                        .find(|(k, _)| t.starts_with(k))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| vec![0.0, 0.0])
                })
                .collect())
        }
    }

    struct Offline;

    impl EmbeddingBackend for Offline {
        fn model_id(&self) -> &str {
            "offline"
        }

        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, BackendError> {
            Err(BackendError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_lexical_scores_normalized_to_best() {
        let mut store = IndexStore::open_in_memory().unwrap();
        index_text(&mut store, "nb", "a.md", "# Garden\ntomato tomato tomato basil\n");
        index_text(&mut store, "nb", "b.md", "# Kitchen\none tomato in the fridge and lots of other words here\n");
        index_text(&mut store, "nb", "c.md", "# Other\nnothing relevant\n");

        let opts = SearchOptions::default()
            .with_mode(SearchMode::Lexical)
            .with_today(today());
        let results = Retriever::new(&store)
            .search("tomato", &DocumentQuery::default(), &opts)
            .unwrap();
        assert_eq!(titles(&results), vec!["Garden", "Kitchen"]);
        assert!((results.hits[0].score - 1.0).abs() < 1e-6);
        assert!(results.hits[1].score < 1.0);
        assert!(!results.degraded);
        assert!(results.hits[0].snippet.contains("tomato"));
    }

    #[test]
    fn test_hybrid_default_weights_favor_vector() {
        let mut store = IndexStore::open_in_memory().unwrap();
        // Lexically moderate, semantically unrelated
        index_text(&mut store, "nb", "lex.md", "# lexdoc\nrust borrow checker notes\n");
        // No shared words, semantically identical
        index_text(&mut store, "nb", "vec.md", "# vecdoc\nownership lifetimes\n");
        let backend = Fixed(vec![
            ("rust borrow", vec![1.0, 0.0]),
            ("lexdoc", vec![0.0, 1.0]),
            ("vecdoc", vec![1.0, 0.0]),
        ]);
        embed_all(&store, &backend);

        let opts = SearchOptions::default().with_today(today());
        let results = Retriever::new(&store)
            .with_backend(&backend)
            .search("rust borrow", &DocumentQuery::default(), &opts)
            .unwrap();
        assert_eq!(results.mode, SearchMode::Hybrid);
        assert_eq!(titles(&results), vec!["vecdoc", "lexdoc"]);
        assert_eq!(results.hits[0].lexical, None);
        assert!((results.hits[0].score - 0.7).abs() < 1e-5);
        assert!((results.hits[1].score - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_backend_failure_degrades_to_lexical() {
        let mut store = IndexStore::open_in_memory().unwrap();
        index_text(&mut store, "nb", "a.md", "# Alpha\nquarterly report\n");
        let opts = SearchOptions::default().with_today(today());

        let results = Retriever::new(&store)
            .with_backend(&Offline)
            .search("report", &DocumentQuery::default(), &opts)
            .unwrap();
        assert!(results.degraded);
        assert_eq!(results.mode, SearchMode::Lexical);
        assert_eq!(titles(&results), vec!["Alpha"]);

        let results = Retriever::new(&store)
            .search("report", &DocumentQuery::default(), &opts.clone().with_mode(SearchMode::Vector))
            .unwrap();
        assert!(results.degraded);
        assert_eq!(results.hits.len(), 1);
    }

    #[test]
    fn test_vector_mode_finds_without_shared_words() {
        let mut store = IndexStore::open_in_memory().unwrap();
        index_text(&mut store, "nb", "a.md", "grocery list milk eggs bread butter\n");
        index_text(&mut store, "nb", "b.md", "quarterly revenue finance report\n");
        let backend = HashingEmbedder::new(256);
        embed_all(&store, &backend);

        let opts = SearchOptions::default()
            .with_mode(SearchMode::Vector)
            .with_today(today());
        let results = Retriever::new(&store)
            .with_backend(&backend)
            .search("milk and eggs", &DocumentQuery::default(), &opts)
            .unwrap();
        assert_eq!(results.hits[0].document.path, "a.md");
        assert!(results.hits.iter().all(|h| h.score <= 1.0 && h.score >= 0.0));
    }

    #[test]
    fn test_filters_and_threshold() {
        let mut store = IndexStore::open_in_memory().unwrap();
        index_text(&mut store, "home", "a.md", "# A\nbudget #finance\n");
        index_text(&mut store, "work", "b.md", "# B\nbudget budget budget\n");
        let opts = SearchOptions::default()
            .with_mode(SearchMode::Lexical)
            .with_today(today());
        let retriever = Retriever::new(&store);

        let by_notebook = DocumentQuery {
            notebook: Some("home".into()),
            ..Default::default()
        };
        assert_eq!(titles(&retriever.search("budget", &by_notebook, &opts).unwrap()), vec!["A"]);

        let by_tag = DocumentQuery {
            tag: Some("finance".into()),
            ..Default::default()
        };
        assert_eq!(titles(&retriever.search("budget", &by_tag, &opts).unwrap()), vec!["A"]);

        let strict = opts.clone().with_min_score(0.99);
        let results = retriever.search("budget", &DocumentQuery::default(), &strict).unwrap();
        assert_eq!(results.hits.len(), 1);
    }

    #[test]
    fn test_recency_halves_per_half_life() {
        let mut store = IndexStore::open_in_memory().unwrap();
        let id = index_text(&mut store, "nb", "2026-10-09-log.md", "entry\n");
        let doc = store.document(id).unwrap().unwrap();
        assert_eq!(doc.date, NaiveDate::from_ymd_opt(2026, 10, 9));
        let m = recency_multiplier(&doc, today(), 10.0);
        assert!((m - 0.5).abs() < 1e-6);
        assert_eq!(recency_multiplier(&doc, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 10.0), 1.0);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(SearchMode::parse_mode("Hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(SearchMode::parse_mode("semantic"), Some(SearchMode::Vector));
        assert_eq!(SearchMode::parse_mode("fuzzy"), None);
    }

    #[test]
    fn test_snippet_prefers_matching_line() {
        assert_eq!(snippet("# Title\n\nfirst\nthe Milk line\n", "milk"), "the Milk line");
        assert_eq!(snippet("\n\nfirst\nsecond\n", "zzz"), "first");
    }
}
