//! Token-budget-aware context trimming.
//!
//! Raw context text is split into sections (bracketed ISO-8601
//! timestamps first, blank-line paragraphs as the fallback, oversized
//! sections re-split at sentence boundaries), each section is scored,
//! and the highest-scored sections are greedily packed into 95% of the
//! budget. When meaningful space remains, the next section is truncated
//! at a sentence boundary and marked with an ellipsis.

use regex_lite::Regex;

/// Sections longer than this are re-split at sentence boundaries.
const MAX_SECTION_CHARS: usize = 1000;
/// Splitting never produces sections shorter than this.
const MIN_SECTION_CHARS: usize = 50;
/// Fraction of the budget the greedy pass may fill.
const PACK_FRACTION: f64 = 0.95;
/// Partial inclusion only happens when at least this many tokens remain.
const MIN_REMAINDER_TOKENS: usize = 100;
/// A truncated section must preserve at least this fraction of the
/// content that would have fit.
const MIN_TRUNCATION_KEEP: f64 = 0.7;

/// Estimate the token count of a text: `ceil(chars / 4 × 1.1)`.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    ((chars as f64 / 4.0) * 1.1).ceil() as usize
}

/// Result of an optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedContext {
    /// The packed content, sections in their original order.
    pub content: String,
    /// Estimated token count of `content`.
    pub estimated_tokens: usize,
    /// Sections produced by splitting.
    pub sections_total: usize,
    /// Sections included (fully or truncated).
    pub sections_kept: usize,
    /// Whether a section was truncated to fit.
    pub truncated: bool,
}

/// Splits, scores, and packs context text into a token budget.
#[derive(Debug)]
pub struct ContextOptimizer {
    timestamp_pattern: Regex,
    sentence_pattern: Regex,
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextOptimizer {
    /// Create an optimizer.
    pub fn new() -> Self {
        Self {
            // Bracketed ISO-8601 timestamps like [2026-07-31T12:00:00Z].
            timestamp_pattern: Regex::new(r"\[\d{4}-\d{2}-\d{2}T[0-9:.+\-Zz]+\]")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
            sentence_pattern: Regex::new(r"[.!?]\s")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
        }
    }

    /// Trim `content` into `token_budget` tokens.
    pub fn optimize(&self, content: &str, token_budget: usize) -> OptimizedContext {
        let sections = self.split_sections(content);
        let sections_total = sections.len();

        let scored = self.score_sections(&sections);
        // Highest score first; ties keep original order for stability.
        let mut ranked: Vec<usize> = (0..sections.len()).collect();
        ranked.sort_by(|&a, &b| {
            scored[b]
                .partial_cmp(&scored[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let pack_budget = (token_budget as f64 * PACK_FRACTION) as usize;
        let mut used_tokens = 0usize;
        let mut kept: Vec<usize> = Vec::new();
        let mut skipped: Vec<usize> = Vec::new();
        for &index in &ranked {
            let cost = estimate_tokens(&sections[index]);
            if used_tokens + cost <= pack_budget {
                used_tokens += cost;
                kept.push(index);
            } else {
                skipped.push(index);
            }
        }

        // Partial inclusion of the best skipped section.
        let mut truncated_section: Option<(usize, String)> = None;
        let remaining = pack_budget.saturating_sub(used_tokens);
        if remaining > MIN_REMAINDER_TOKENS {
            if let Some(&index) = skipped.first() {
                if let Some(cut) = self.truncate_at_sentence(&sections[index], remaining) {
                    used_tokens += estimate_tokens(&cut);
                    truncated_section = Some((index, cut));
                }
            }
        }

        // Reassemble in original order.
        let mut pieces: Vec<(usize, &str)> = kept
            .iter()
            .map(|&index| (index, sections[index].as_str()))
            .collect();
        if let Some((index, cut)) = &truncated_section {
            pieces.push((*index, cut.as_str()));
        }
        pieces.sort_by_key(|(index, _)| *index);

        let content: String = pieces
            .iter()
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join("\n\n");

        OptimizedContext {
            estimated_tokens: estimate_tokens(&content),
            sections_kept: pieces.len(),
            sections_total,
            truncated: truncated_section.is_some(),
            content,
        }
    }

    /// Split content into sections.
    pub fn split_sections(&self, content: &str) -> Vec<String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        // Prefer splitting at bracketed timestamps, keeping each
        // timestamp with the text that follows it.
        let starts: Vec<usize> = self
            .timestamp_pattern
            .find_iter(trimmed)
            .map(|m| m.start())
            .collect();
        let coarse: Vec<String> = if starts.len() > 1 {
            let mut bounds = starts;
            if bounds[0] != 0 {
                bounds.insert(0, 0);
            }
            bounds.push(trimmed.len());
            bounds
                .windows(2)
                .map(|w| trimmed[w[0]..w[1]].trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            trimmed
                .split("\n\n")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        // Re-split oversized sections at sentence boundaries.
        let mut sections = Vec::new();
        for section in coarse {
            if section.chars().count() <= MAX_SECTION_CHARS {
                sections.push(section);
                continue;
            }
            let mut current = String::new();
            let mut last_end = 0;
            for m in self.sentence_pattern.find_iter(&section) {
                current.push_str(&section[last_end..m.end()]);
                last_end = m.end();
                if current.chars().count() >= MAX_SECTION_CHARS / 2 {
                    sections.push(current.trim().to_string());
                    current = String::new();
                }
            }
            current.push_str(&section[last_end..]);
            let tail = current.trim().to_string();
            if tail.chars().count() >= MIN_SECTION_CHARS {
                sections.push(tail);
            } else if !tail.is_empty() {
                if let Some(last) = sections.last_mut() {
                    last.push(' ');
                    last.push_str(&tail);
                } else {
                    sections.push(tail);
                }
            }
        }
        sections
    }

    fn score_sections(&self, sections: &[String]) -> Vec<f64> {
        let total = sections.len().max(1);
        sections
            .iter()
            .enumerate()
            .map(|(index, section)| self.score_section(section, index, total))
            .collect()
    }

    /// Score one section. Weights follow the packing policy: recency,
    /// code and structure, Q&A patterns, error markers, and lists each
    /// add; repetitive text subtracts.
    pub fn score_section(&self, section: &str, index: usize, total: usize) -> f64 {
        let mut score = 0.1;

        // Later sections are more recent.
        score += 0.3 * ((index + 1) as f64 / total as f64);

        let lower = section.to_lowercase();
        const CODE_MARKERS: [&str; 8] = [
            "```", "fn ", "function", "=> ", "{", "impl ", "class ", "();",
        ];
        if CODE_MARKERS.iter().any(|marker| section.contains(marker)) {
            score += 0.4;
        }

        const QA_MARKERS: [&str; 5] = ["q:", "a:", "question", "answer", "how do"];
        if QA_MARKERS.iter().any(|marker| lower.contains(marker)) || section.contains('?') {
            score += 0.3;
        }

        const ERROR_MARKERS: [&str; 5] = ["error", "failed", "exception", "panic", "warning"];
        if ERROR_MARKERS.iter().any(|marker| lower.contains(marker)) {
            score += 0.2;
        }

        let structured_lines = section
            .lines()
            .map(str::trim_start)
            .filter(|line| {
                line.starts_with('-')
                    || line.starts_with('*')
                    || line.starts_with('#')
                    || line.chars().next().is_some_and(|c| c.is_ascii_digit())
            })
            .count();
        if structured_lines >= 2 {
            score += 0.25;
        }

        if repetition_ratio(section) > 0.6 {
            score -= 0.3;
        }

        score.clamp(0.0, 2.0)
    }

    /// Cut `section` at a sentence boundary so it fits `token_budget`.
    ///
    /// Returns `None` when no boundary preserves at least 70% of the
    /// content that would have fit.
    fn truncate_at_sentence(&self, section: &str, token_budget: usize) -> Option<String> {
        // Invert the token estimate to a character target.
        let target_chars = ((token_budget as f64 / 1.1) * 4.0) as usize;
        if target_chars >= section.len() {
            return Some(section.to_string());
        }
        let min_chars = (target_chars as f64 * MIN_TRUNCATION_KEEP) as usize;

        let cut_end = self
            .sentence_pattern
            .find_iter(section)
            .map(|m| m.end())
            .take_while(|&end| end <= target_chars)
            .last()?;
        if cut_end < min_chars {
            return None;
        }
        Some(format!("{}…", section[..cut_end].trim_end()))
    }
}

/// Fraction of long words (> 4 chars) that are repeats.
fn repetition_ratio(section: &str) -> f64 {
    let words: Vec<&str> = section
        .split_whitespace()
        .filter(|word| word.chars().count() > 4)
        .collect();
    if words.len() < 5 {
        return 0.0;
    }
    let unique: std::collections::HashSet<String> =
        words.iter().map(|word| word.to_lowercase()).collect();
    1.0 - unique.len() as f64 / words.len() as f64
}

#[cfg(test)]
#[path = "optimizer.test.rs"]
mod tests;
