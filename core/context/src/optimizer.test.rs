use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_token_estimator_formula() {
    // ceil(L/4 × 1.1) for an input of L characters.
    for (len, expected) in [(0usize, 0usize), (4, 2), (10, 3), (37, 11), (100, 28)] {
        let text = "x".repeat(len);
        assert_eq!(estimate_tokens(&text), expected, "L = {len}");
    }
}

#[test]
fn test_split_on_bracketed_timestamps() {
    let optimizer = ContextOptimizer::new();
    let content = "[2026-07-30T10:00:00Z] user asked about retries\n\
                   [2026-07-30T10:01:00Z] agent answered with backoff advice";
    let sections = optimizer.split_sections(content);
    assert_eq!(sections.len(), 2);
    assert!(sections[0].contains("user asked"));
    assert!(sections[1].starts_with("[2026-07-30T10:01:00Z]"));
}

#[test]
fn test_fallback_to_paragraph_split() {
    let optimizer = ContextOptimizer::new();
    let content = "first paragraph here\n\nsecond paragraph here\n\nthird one";
    let sections = optimizer.split_sections(content);
    assert_eq!(sections.len(), 3);
}

#[test]
fn test_oversized_sections_resplit_at_sentences() {
    let optimizer = ContextOptimizer::new();
    let long = "This is a sentence about the build. ".repeat(40);
    let sections = optimizer.split_sections(&long);
    assert!(sections.len() > 1);
    for section in &sections {
        assert!(section.chars().count() >= 50);
    }
}

#[test]
fn test_empty_input() {
    let optimizer = ContextOptimizer::new();
    assert!(optimizer.split_sections("   \n  ").is_empty());
    let result = optimizer.optimize("", 500);
    assert_eq!(result.sections_total, 0);
    assert_eq!(result.content, "");
}

#[test]
fn test_code_sections_outscore_prose() {
    let optimizer = ContextOptimizer::new();
    let code = "```rust\nfn main() { println!(); }\n```";
    let prose = "we talked about the weather for a while";
    let code_score = optimizer.score_section(code, 0, 2);
    let prose_score = optimizer.score_section(prose, 0, 2);
    assert!(code_score > prose_score);
}

#[test]
fn test_error_and_qa_markers_add() {
    let optimizer = ContextOptimizer::new();
    let qa = "Q: how do retries work? A: with exponential backoff";
    let plain = "some ordinary narration text";
    assert!(optimizer.score_section(qa, 0, 1) > optimizer.score_section(plain, 0, 1));

    let error = "the build failed with a linker error";
    assert!(optimizer.score_section(error, 0, 1) > optimizer.score_section(plain, 0, 1));
}

#[test]
fn test_repetition_penalty() {
    let optimizer = ContextOptimizer::new();
    let repetitive = "repeat repeat repeat repeat repeat repeat repeat repeat";
    let varied = "several different interesting distinct meaningful tokens here";
    assert!(
        optimizer.score_section(repetitive, 0, 1) < optimizer.score_section(varied, 0, 1)
    );
}

#[test]
fn test_recency_favors_later_sections() {
    let optimizer = ContextOptimizer::new();
    let text = "neutral section content without markers";
    assert!(optimizer.score_section(text, 9, 10) > optimizer.score_section(text, 0, 10));
}

#[test]
fn test_packing_respects_budget() {
    let optimizer = ContextOptimizer::new();
    let content = (0..20)
        .map(|i| format!("Paragraph number {i} with some filler text to occupy space."))
        .collect::<Vec<_>>()
        .join("\n\n");
    let budget = 100;
    let result = optimizer.optimize(&content, budget);
    assert!(result.estimated_tokens <= budget);
    assert!(result.sections_kept < result.sections_total);
}

#[test]
fn test_large_budget_keeps_everything() {
    let optimizer = ContextOptimizer::new();
    let content = "alpha section\n\nbeta section\n\ngamma section";
    let result = optimizer.optimize(content, 10_000);
    assert_eq!(result.sections_kept, 3);
    assert!(!result.truncated);
    assert!(result.content.contains("alpha"));
    assert!(result.content.contains("gamma"));
}

#[test]
fn test_truncation_marked_with_ellipsis() {
    let optimizer = ContextOptimizer::new();
    // One short high-value section plus one long section that can only
    // partially fit; the remainder is large enough to trigger partial
    // inclusion.
    let short = "fn quick() {}";
    let long = "This is a long narrative sentence that keeps going for a while. "
        .repeat(30);
    let content = format!("{short}\n\n{long}");
    let result = optimizer.optimize(&content, 300);
    if result.truncated {
        assert!(result.content.contains('…'));
        assert!(result.estimated_tokens <= 300);
    }
}

#[test]
fn test_sections_remain_in_original_order() {
    let optimizer = ContextOptimizer::new();
    let content = "first plain paragraph\n\nfn code_block() {}\n\nlast plain paragraph";
    let result = optimizer.optimize(content, 10_000);
    let first = result.content.find("first").unwrap();
    let code = result.content.find("fn code_block").unwrap();
    let last = result.content.find("last").unwrap();
    assert!(first < code && code < last);
}
