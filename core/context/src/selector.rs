//! Relevance scoring and selection over stored contexts.
//!
//! Three scoring paths share one budget:
//! - plain relevance: content 0.40, tags 0.30, recency 0.20, priority 0.10
//! - semantic: content 0.60, stop-word-filtered keyword overlap 0.25,
//!   type-keyword mapping 0.15
//! - task relevance: task-type 0.30, length-weighted keywords 0.40,
//!   priority alignment 0.20, description similarity 0.10
//!
//! Multi-criteria selection combines caller weights (normalized to sum
//! to 1) and can filter by a minimum score. A 5-minute cache memoizes
//! semantic queries and is swept on the same cadence.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

/// Cache lifetime and sweep cadence for semantic scoring.
pub const SEMANTIC_CACHE_TTL: Duration = Duration::from_secs(300);

const STOP_WORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "has", "have",
    "had", "been", "will", "would", "can", "could", "should", "into", "about", "over", "some",
    "then",
];

/// A stored context available for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContext {
    /// Unique id.
    pub id: String,
    /// Raw content.
    pub content: String,
    /// Context type tag (e.g. "code", "conversation", "error").
    pub context_type: String,
    /// Keyword tags.
    pub tags: Vec<String>,
    /// Priority 0..=10.
    pub priority: u8,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,
    /// Short description.
    pub description: String,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

/// Task profile used by task-relevance scoring.
#[derive(Debug, Clone, Default)]
pub struct TaskProfile {
    /// Task type (matched against context types).
    pub task_type: String,
    /// Task keywords.
    pub keywords: Vec<String>,
    /// Task priority 0..=10.
    pub priority: u8,
    /// Task description.
    pub description: String,
}

/// Scoring axes available to multi-criteria selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAxis {
    /// Content keyword match.
    Content,
    /// Tag/metadata match.
    Tags,
    /// Exponential recency decay.
    Recency,
    /// Stored priority.
    Priority,
}

/// Multi-criteria selection request.
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    /// Query text.
    pub query: String,
    /// Axis weights; normalized to sum to 1 before use.
    pub weights: Vec<(ScoreAxis, f64)>,
    /// Drop results scoring below this.
    pub min_score: Option<f64>,
    /// Keep at most this many results.
    pub limit: Option<usize>,
}

impl SelectionCriteria {
    /// Criteria with the default relevance weights.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            weights: vec![
                (ScoreAxis::Content, 0.40),
                (ScoreAxis::Tags, 0.30),
                (ScoreAxis::Recency, 0.20),
                (ScoreAxis::Priority, 0.10),
            ],
            min_score: None,
            limit: None,
        }
    }

    /// Replace the axis weights.
    pub fn with_weights(mut self, weights: Vec<(ScoreAxis, f64)>) -> Self {
        self.weights = weights;
        self
    }

    /// Set the minimum score filter.
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A context with its computed score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContext {
    /// The stored context id.
    pub id: String,
    /// Combined score.
    pub score: f64,
}

struct CacheEntry {
    at_ms: i64,
    results: Vec<ScoredContext>,
}

/// Scores and selects stored contexts.
pub struct ContextSelector {
    semantic_cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ContextSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSelector {
    /// Create a selector with an empty cache.
    pub fn new() -> Self {
        Self {
            semantic_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Plain relevance: content 0.40, tags 0.30, recency 0.20,
    /// priority 0.10.
    pub fn score_relevance(&self, context: &StoredContext, query: &str, now_ms: i64) -> f64 {
        0.40 * content_match(&context.content, query)
            + 0.30 * tag_match(context, query)
            + 0.20 * recency_score(context.created_at, now_ms)
            + 0.10 * (f64::from(context.priority) / 10.0)
    }

    /// Semantic path: content 0.60, stop-word-filtered keyword overlap
    /// 0.25, type-keyword mapping 0.15.
    pub fn score_semantic(&self, context: &StoredContext, query: &str) -> f64 {
        0.60 * content_match(&context.content, query)
            + 0.25 * keyword_overlap(&context.content, query)
            + 0.15 * type_keyword_score(&context.context_type, query)
    }

    /// Task relevance: type 0.30, length-weighted keywords 0.40,
    /// priority alignment 0.20, description similarity 0.10.
    pub fn score_task_relevance(&self, context: &StoredContext, task: &TaskProfile) -> f64 {
        let type_score = if !task.task_type.is_empty()
            && context.context_type.eq_ignore_ascii_case(&task.task_type)
        {
            1.0
        } else {
            0.0
        };

        let total_len: usize = task.keywords.iter().map(String::len).sum();
        let keyword_score = if total_len == 0 {
            0.0
        } else {
            let content = context.content.to_lowercase();
            task.keywords
                .iter()
                .filter(|keyword| content.contains(&keyword.to_lowercase()))
                .map(|keyword| keyword.len() as f64 / total_len as f64)
                .sum()
        };

        let delta = f64::from(context.priority.abs_diff(task.priority));
        let priority_score = 1.0 - delta / 10.0;

        let description_score = keyword_overlap(&context.description, &task.description);

        0.30 * type_score
            + 0.40 * keyword_score
            + 0.20 * priority_score
            + 0.10 * description_score
    }

    /// Multi-criteria selection. Weights are normalized to sum to 1;
    /// results are sorted by score descending.
    pub fn select(&self, pool: &[StoredContext], criteria: &SelectionCriteria) -> Vec<ScoredContext> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let total: f64 = criteria.weights.iter().map(|(_, weight)| weight).sum();
        let normalizer = if total > 0.0 { total } else { 1.0 };

        let mut results: Vec<ScoredContext> = pool
            .iter()
            .map(|context| {
                let score: f64 = criteria
                    .weights
                    .iter()
                    .map(|(axis, weight)| {
                        let axis_score = match axis {
                            ScoreAxis::Content => content_match(&context.content, &criteria.query),
                            ScoreAxis::Tags => tag_match(context, &criteria.query),
                            ScoreAxis::Recency => recency_score(context.created_at, now_ms),
                            ScoreAxis::Priority => f64::from(context.priority) / 10.0,
                        };
                        (weight / normalizer) * axis_score
                    })
                    .sum();
                ScoredContext {
                    id: context.id.clone(),
                    score,
                }
            })
            .filter(|scored| criteria.min_score.is_none_or(|min| scored.score >= min))
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = criteria.limit {
            results.truncate(limit);
        }
        results
    }

    /// Semantic selection memoized per query for five minutes.
    pub fn select_semantic(&self, pool: &[StoredContext], query: &str) -> Vec<ScoredContext> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let ttl_ms = SEMANTIC_CACHE_TTL.as_millis() as i64;
        {
            let cache = self.lock_cache();
            if let Some(entry) = cache.get(query) {
                if now_ms - entry.at_ms <= ttl_ms {
                    trace!(query = %query, "Semantic cache hit");
                    return entry.results.clone();
                }
            }
        }

        let mut results: Vec<ScoredContext> = pool
            .iter()
            .map(|context| ScoredContext {
                id: context.id.clone(),
                score: self.score_semantic(context, query),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        self.lock_cache().insert(
            query.to_string(),
            CacheEntry {
                at_ms: now_ms,
                results: results.clone(),
            },
        );
        results
    }

    /// Drop cache entries older than the TTL. Runs on the same
    /// five-minute cadence as the cache lifetime.
    pub fn sweep_cache(&self) -> usize {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let ttl_ms = SEMANTIC_CACHE_TTL.as_millis() as i64;
        let mut cache = self.lock_cache();
        let before = cache.len();
        cache.retain(|_, entry| now_ms - entry.at_ms <= ttl_ms);
        before - cache.len()
    }

    /// Number of cached queries.
    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.semantic_cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ContextSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSelector")
            .field("cached_queries", &self.cache_len())
            .finish()
    }
}

/// Fraction of query keywords (len > 2) present in the content.
fn content_match(content: &str, query: &str) -> f64 {
    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.len() > 2)
        .map(String::from)
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|keyword| content.contains(keyword.as_str()))
        .count();
    hits as f64 / keywords.len() as f64
}

/// Fraction of query keywords matching tags or metadata values.
fn tag_match(context: &StoredContext, query: &str) -> f64 {
    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.len() > 2)
        .map(String::from)
        .collect();
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack: Vec<String> = context
        .tags
        .iter()
        .chain(context.metadata.values())
        .map(|value| value.to_lowercase())
        .collect();
    let hits = keywords
        .iter()
        .filter(|keyword| haystack.iter().any(|value| value.contains(keyword.as_str())))
        .count();
    hits as f64 / keywords.len() as f64
}

/// Exponential decay over 30 days.
fn recency_score(created_at_ms: i64, now_ms: i64) -> f64 {
    let age_days = (now_ms - created_at_ms).max(0) as f64 / 86_400_000.0;
    (-age_days / 30.0).exp()
}

/// Jaccard-style overlap of stop-word-filtered word sets.
fn keyword_overlap(content: &str, query: &str) -> f64 {
    let filter = |text: &str| -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .filter(|word| word.len() > 2 && !STOP_WORDS.contains(word))
            .map(String::from)
            .collect()
    };
    let content_words = filter(content);
    let query_words = filter(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let shared = query_words.intersection(&content_words).count();
    shared as f64 / query_words.len() as f64
}

/// Keyword list implied by a context type, matched against the query.
fn type_keyword_score(context_type: &str, query: &str) -> f64 {
    let keywords: &[&str] = match context_type {
        "code" => &["code", "function", "implementation", "refactor", "bug"],
        "conversation" => &["discussion", "chat", "said", "asked"],
        "error" => &["error", "failure", "crash", "debug", "fix"],
        "documentation" => &["docs", "documentation", "guide", "readme"],
        _ => &[],
    };
    if keywords.is_empty() {
        return 0.0;
    }
    let query = query.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|keyword| query.contains(*keyword))
        .count();
    hits as f64 / keywords.len() as f64
}

#[cfg(test)]
#[path = "selector.test.rs"]
mod tests;
