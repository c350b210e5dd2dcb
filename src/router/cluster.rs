use std::collections::HashSet;

use super::rerank::thematic_keywords;
use crate::types::{CleanedSource, SourceId};

/// Fraction of a theme's sources that must overlap an earlier theme for the
/// two to be consolidated.
const MERGE_OVERLAP: f64 = 0.5;

/// Group ranked sources into consolidated thematic clusters. A keyword only
/// becomes a theme when at least two sources share it; overlapping themes
/// are merged greedily, largest first.
pub fn cluster_by_theme(ranked: &[(SourceId, CleanedSource)]) -> Vec<(String, Vec<SourceId>)> {
    let source_keywords: Vec<(&SourceId, Vec<String>)> = ranked
        .iter()
        .map(|(id, source)| (id, thematic_keywords(source)))
        .collect();

    // Keywords in first-seen order across the ranked sources.
    let mut keyword_order: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for (_, keywords) in &source_keywords {
        for keyword in keywords {
            if seen.insert(keyword.as_str()) {
                keyword_order.push(keyword.clone());
            }
        }
    }

    let mut themes: Vec<(String, Vec<SourceId>)> = Vec::new();
    for keyword in keyword_order {
        let members: Vec<SourceId> = source_keywords
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| *k == keyword))
            .map(|(id, _)| (*id).clone())
            .collect();
        if members.len() > 1 {
            themes.push((keyword, members));
        }
    }

    consolidate_themes(themes)
}

/// Merge overlapping themes. Themes are processed by descending size; a later
/// theme is folded into the current one when more than half of its sources
/// are already covered. Consumed themes are skipped. Merged themes get a
/// composite label recording how many themes were folded in.
pub fn consolidate_themes(
    mut themes: Vec<(String, Vec<SourceId>)>,
) -> Vec<(String, Vec<SourceId>)> {
    themes.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut consumed: Vec<bool> = vec![false; themes.len()];
    let mut consolidated: Vec<(String, Vec<SourceId>)> = Vec::new();

    for i in 0..themes.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;

        let (label, base_sources) = &themes[i];
        let base: HashSet<&SourceId> = base_sources.iter().collect();
        let mut merged_sources: Vec<SourceId> = base_sources.clone();
        let mut merged_count = 0usize;

        for j in (i + 1)..themes.len() {
            if consumed[j] {
                continue;
            }
            let (_, candidate_sources) = &themes[j];
            let shared = candidate_sources
                .iter()
                .filter(|s| base.contains(s))
                .count();
            let overlap = shared as f64 / candidate_sources.len() as f64;

            if overlap > MERGE_OVERLAP {
                consumed[j] = true;
                merged_count += 1;
                for source in candidate_sources {
                    if !merged_sources.contains(source) {
                        merged_sources.push(source.clone());
                    }
                }
            }
        }

        let label = if merged_count > 0 {
            format!("{label}+{merged_count}")
        } else {
            label.clone()
        };
        consolidated.push((label, merged_sources));
    }

    consolidated
}
