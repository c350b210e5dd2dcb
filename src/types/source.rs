use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SourceId, SourceRelevance, SourceType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_id: SourceId,
    pub source_type: SourceType,
    pub url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub retrieved_date: String,
    pub relevance_score: f64,
    pub quality_score: f64,
    pub content_snippet: Option<String>,
}

/// A cleaned external source with content and metadata. Immutable once the
/// ranker has scored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedSource {
    pub metadata: SourceMetadata,
    pub content: String,
    pub keywords: Vec<String>,
    pub relevance: SourceRelevance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuote {
    pub content: String,
    pub context: String,
    pub relevance: f64,
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInsight {
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub related_insights: Vec<String>,
    #[serde(default)]
    pub supporting_quotes: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

/// The result of a source agent's full analysis pass over one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSource {
    pub source_id: SourceId,
    pub content_type: String,
    pub confidence_score: f64,
    pub domain_tags: Vec<String>,
    pub processed_at: DateTime<Utc>,
    pub potential_clarifications: Vec<String>,
    pub key_insights: Vec<SourceInsight>,
    pub major_themes: Vec<String>,
    pub quotes: Vec<ProcessedQuote>,
    pub summary: String,
}

impl ProcessedSource {
    /// Up to `limit` quotes, most relevant first.
    pub fn top_quotes(&self, limit: usize) -> Vec<String> {
        let mut quotes: Vec<&ProcessedQuote> = self.quotes.iter().collect();
        quotes.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        quotes
            .into_iter()
            .take(limit)
            .map(|q| q.content.clone())
            .collect()
    }
}

/// Plan produced before deep analysis of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationPlan {
    #[serde(default = "unknown_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub key_areas: Vec<String>,
    #[serde(default)]
    pub priority_themes: Vec<String>,
}

fn unknown_content_type() -> String {
    "unknown".to_string()
}

impl Default for ExplorationPlan {
    fn default() -> Self {
        Self {
            content_type: unknown_content_type(),
            key_areas: Vec::new(),
            priority_themes: Vec::new(),
        }
    }
}
