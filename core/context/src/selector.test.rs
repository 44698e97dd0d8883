use super::*;
use pretty_assertions::assert_eq;

fn stored(id: &str, content: &str, context_type: &str, tags: &[&str], priority: u8) -> StoredContext {
    StoredContext {
        id: id.to_string(),
        content: content.to_string(),
        context_type: context_type.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        priority,
        created_at: chrono::Utc::now().timestamp_millis(),
        description: content.chars().take(40).collect(),
        metadata: HashMap::new(),
    }
}

#[test]
fn test_content_match_drives_relevance() {
    let selector = ContextSelector::new();
    let now = chrono::Utc::now().timestamp_millis();
    let matching = stored("a", "retry logic with exponential backoff", "code", &[], 5);
    let unrelated = stored("b", "notes about the team lunch", "conversation", &[], 5);

    let query = "exponential backoff retry";
    assert!(
        selector.score_relevance(&matching, query, now)
            > selector.score_relevance(&unrelated, query, now)
    );
}

#[test]
fn test_recency_decay() {
    let selector = ContextSelector::new();
    let now = chrono::Utc::now().timestamp_millis();
    let fresh = stored("fresh", "same content here", "code", &[], 5);
    let mut old = fresh.clone();
    old.id = "old".to_string();
    old.created_at = now - 60 * 86_400_000; // 60 days

    assert!(
        selector.score_relevance(&fresh, "content", now)
            > selector.score_relevance(&old, "content", now)
    );
}

#[test]
fn test_tag_match_contributes() {
    let selector = ContextSelector::new();
    let now = chrono::Utc::now().timestamp_millis();
    let tagged = stored("a", "irrelevant body", "code", &["database", "migration"], 5);
    let untagged = stored("b", "irrelevant body", "code", &[], 5);

    let query = "database migration";
    assert!(
        selector.score_relevance(&tagged, query, now)
            > selector.score_relevance(&untagged, query, now)
    );
}

#[test]
fn test_semantic_scoring_filters_stop_words() {
    let selector = ContextSelector::new();
    let context = stored("a", "the function that handles parsing", "code", &[], 5);
    // Stop words alone contribute nothing.
    assert_eq!(selector.score_semantic(&context, "the that with"), 0.0);
    assert!(selector.score_semantic(&context, "parsing function") > 0.0);
}

#[test]
fn test_type_keywords_boost_matching_types() {
    let selector = ContextSelector::new();
    let error_context = stored("a", "segfault trace", "error", &[], 5);
    let doc_context = stored("b", "segfault trace", "documentation", &[], 5);
    let query = "debug the crash error";
    assert!(
        selector.score_semantic(&error_context, query)
            > selector.score_semantic(&doc_context, query)
    );
}

#[test]
fn test_task_relevance_components() {
    let selector = ContextSelector::new();
    let context = stored("a", "refactoring the executor module", "code", &[], 7);
    let task = TaskProfile {
        task_type: "code".to_string(),
        keywords: vec!["executor".to_string(), "refactoring".to_string()],
        priority: 7,
        description: "refactoring work".to_string(),
    };
    let score = selector.score_task_relevance(&context, &task);
    // Type (0.3) + all keywords (0.4) + exact priority alignment (0.2)
    // are all earned; description overlap adds the rest.
    assert!(score > 0.85);

    let mismatched_task = TaskProfile {
        task_type: "documentation".to_string(),
        keywords: vec!["unrelated".to_string()],
        priority: 0,
        description: String::new(),
    };
    assert!(selector.score_task_relevance(&context, &mismatched_task) < 0.2);
}

#[test]
fn test_priority_alignment() {
    let selector = ContextSelector::new();
    let near = stored("a", "", "x", &[], 5);
    let far = stored("b", "", "x", &[], 10);
    let task = TaskProfile {
        priority: 5,
        ..TaskProfile::default()
    };
    assert!(
        selector.score_task_relevance(&near, &task) > selector.score_task_relevance(&far, &task)
    );
}

#[test]
fn test_multi_criteria_weights_are_normalized() {
    let selector = ContextSelector::new();
    let pool = vec![
        stored("high-priority", "unrelated body text", "x", &[], 10),
        stored("relevant", "alpha beta gamma", "x", &[], 2),
    ];

    // Weights of 5 and 5 normalize to 0.5/0.5.
    let criteria = SelectionCriteria::new("alpha beta gamma").with_weights(vec![
        (ScoreAxis::Content, 5.0),
        (ScoreAxis::Priority, 5.0),
    ]);
    let results = selector.select(&pool, &criteria);
    assert_eq!(results.len(), 2);
    for scored in &results {
        assert!(scored.score <= 1.0);
    }
    assert_eq!(results[0].id, "relevant");
}

#[test]
fn test_min_score_filter_and_limit() {
    let selector = ContextSelector::new();
    let pool = vec![
        stored("a", "alpha beta", "x", &[], 5),
        stored("b", "alpha", "x", &[], 5),
        stored("c", "nothing", "x", &[], 5),
    ];
    let criteria = SelectionCriteria::new("alpha beta")
        .with_weights(vec![(ScoreAxis::Content, 1.0)])
        .with_min_score(0.4)
        .with_limit(1);
    let results = selector.select(&pool, &criteria);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "a");
}

#[test]
fn test_semantic_cache_memoizes() {
    let selector = ContextSelector::new();
    let pool = vec![stored("a", "alpha beta", "code", &[], 5)];

    let first = selector.select_semantic(&pool, "alpha");
    assert_eq!(selector.cache_len(), 1);

    // A cached query ignores pool changes until the TTL lapses.
    let larger_pool = vec![
        stored("a", "alpha beta", "code", &[], 5),
        stored("b", "alpha alpha", "code", &[], 5),
    ];
    let second = selector.select_semantic(&larger_pool, "alpha");
    assert_eq!(first, second);

    // A different query computes fresh.
    let third = selector.select_semantic(&larger_pool, "beta");
    assert_eq!(third.len(), 2);
    assert_eq!(selector.cache_len(), 2);
}

#[test]
fn test_cache_sweep_drops_only_stale_entries() {
    let selector = ContextSelector::new();
    let pool = vec![stored("a", "alpha", "code", &[], 5)];
    selector.select_semantic(&pool, "alpha");
    assert_eq!(selector.sweep_cache(), 0);
    assert_eq!(selector.cache_len(), 1);
}
