use std::collections::{HashMap, HashSet};

use crate::types::{CleanedSource, SourceId};

const RELEVANCE_WEIGHT: f64 = 0.6;
const QUALITY_WEIGHT: f64 = 0.3;
const DIVERSITY_WEIGHT: f64 = 0.1;

const TITLE_STOP_WORDS: [&str; 3] = ["the", "and", "for"];
const SNIPPET_STOP_WORDS: [&str; 5] = ["the", "and", "for", "that", "with"];
const MAX_KEYWORDS: usize = 10;

/// Filter sources below the quality threshold and order the survivors by a
/// convex combination of relevance, quality, and information diversity.
/// The sort is stable: ties keep insertion order, so identical input always
/// produces identical output.
pub fn rerank_sources(
    sources: Vec<(SourceId, CleanedSource)>,
    refined_query: &str,
    threshold: f64,
) -> Vec<(SourceId, CleanedSource)> {
    let query_words: HashSet<String> = refined_query
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(|w| w.to_lowercase())
        .collect();

    let mut scored: Vec<(f64, (SourceId, CleanedSource))> = sources
        .into_iter()
        .filter(|(_, source)| source.metadata.quality_score >= threshold)
        .map(|(id, source)| {
            let score = source_score(&source, &query_words);
            (score, (id, source))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, entry)| entry).collect()
}

fn source_score(source: &CleanedSource, query_words: &HashSet<String>) -> f64 {
    let relevance_numeric = source.relevance.numeric();

    // Keywords absent from the query signal complementary information.
    let unique_keywords = thematic_keywords(source)
        .into_iter()
        .filter(|k| !query_words.contains(k))
        .count();
    let diversity_score = (unique_keywords as f64 / 5.0).min(1.0);

    RELEVANCE_WEIGHT * relevance_numeric
        + QUALITY_WEIGHT * source.metadata.quality_score
        + DIVERSITY_WEIGHT * diversity_score
}

/// Up to 10 thematic keywords for a source: its own keywords, long title
/// words, and the five most frequent long words from the content snippet.
/// First-seen order, so downstream clustering is deterministic.
pub fn thematic_keywords(source: &CleanedSource) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |word: String, keywords: &mut Vec<String>, seen: &mut HashSet<String>| {
        if !seen.contains(&word) {
            seen.insert(word.clone());
            keywords.push(word);
        }
    };

    for keyword in &source.keywords {
        push(keyword.to_lowercase(), &mut keywords, &mut seen);
    }

    if let Some(title) = &source.metadata.title {
        for word in title.split_whitespace() {
            let word = word.to_lowercase();
            if word.len() > 3 && !TITLE_STOP_WORDS.contains(&word.as_str()) {
                push(word, &mut keywords, &mut seen);
            }
        }
    }

    if let Some(snippet) = &source.metadata.content_snippet {
        for word in top_snippet_words(snippet, 5) {
            push(word, &mut keywords, &mut seen);
        }
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}

/// Most frequent long words in a snippet, ties broken by first occurrence.
fn top_snippet_words(snippet: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for word in snippet.split_whitespace() {
        let word = word.to_lowercase();
        if word.len() > 4 && !SNIPPET_STOP_WORDS.contains(&word.as_str()) {
            let entry = counts.entry(word).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}
