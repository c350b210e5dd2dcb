use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::providers::llm::{parse_structured, CompletionOptions, CompletionProvider, Message};
use crate::providers::ContentExtractor;
use crate::types::{
    ExplorationPlan, ProcessedQuote, ProcessedSource, SourceId, SourceInsight,
};

const EXPLORATION_TEMPERATURE: f32 = 0.3;
const CLARIFICATION_TEMPERATURE: f32 = 0.7;
const PLAN_MAX_TOKENS: u32 = 2000;
const ANALYSIS_MAX_TOKENS: u32 = 8192;
const SUMMARY_MAX_TOKENS: u32 = 500;
const CLARIFICATION_MAX_TOKENS: u32 = 1000;
const VERIFICATION_MAX_TOKENS: u32 = 500;

/// Verification confidence required before a clarification answer is cached.
/// Lower-confidence answers are still returned, but treated as provisional.
const CLARIFICATION_CACHE_THRESHOLD: f64 = 0.75;
const QUOTE_RELEVANCE_THRESHOLD: f64 = 0.8;
const INSIGHT_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Deserialize, Default)]
struct QuoteSheet {
    #[serde(default)]
    quotes: Vec<ProcessedQuote>,
}

#[derive(Debug, Deserialize, Default)]
struct InsightSheet {
    #[serde(default)]
    insights: Vec<SourceInsight>,
}

#[derive(Debug, Deserialize)]
struct Verification {
    #[serde(default)]
    confidence: f64,
}

/// A stateful worker owning a disjoint subset of sources. Analyzes each
/// source through the completion service and answers clarification queries
/// grounded in that analysis.
///
/// Internal maps sit behind their own locks so concurrent clarification
/// requests routed to the same agent never race on the cache.
pub struct SourceAgent {
    completion: Arc<dyn CompletionProvider>,
    extractor: Arc<dyn ContentExtractor>,
    meta_prompt: String,
    role_context: String,
    objectives: Vec<String>,
    processed_sources: RwLock<HashMap<SourceId, ProcessedSource>>,
    clarification_cache: RwLock<HashMap<(SourceId, String), String>>,
}

impl SourceAgent {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        extractor: Arc<dyn ContentExtractor>,
        meta_prompt: impl Into<String>,
        role_context: impl Into<String>,
        objectives: Vec<String>,
    ) -> Self {
        Self {
            completion,
            extractor,
            meta_prompt: meta_prompt.into(),
            role_context: role_context.into(),
            objectives,
            processed_sources: RwLock::new(HashMap::new()),
            clarification_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_source(&self, source_id: &str) -> bool {
        self.processed_sources
            .read()
            .unwrap()
            .contains_key(source_id)
    }

    pub fn processed(&self, source_id: &str) -> Option<ProcessedSource> {
        self.processed_sources.read().unwrap().get(source_id).cloned()
    }

    /// Top supporting quotes for a processed source, at most three.
    pub fn supporting_quotes(&self, source_id: &str) -> Vec<String> {
        self.processed(source_id)
            .map(|p| p.top_quotes(3))
            .unwrap_or_default()
    }

    pub fn confidence(&self, source_id: &str) -> Option<f64> {
        self.processed(source_id).map(|p| p.confidence_score)
    }

    /// Run the full analysis pipeline for one source: fetch, plan, extract
    /// quotes, derive insights, summarize. Transport failures propagate;
    /// malformed structured output degrades to empty defaults.
    pub async fn process_source(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<ProcessedSource, Error> {
        let content = self
            .extractor
            .extract(url)
            .await
            .map_err(|e| Error::Extraction {
                url: url.to_string(),
                source: e,
            })?;

        let plan = self.plan_exploration(&content).await?;
        let quotes = self.extract_quotes(&content, &plan.priority_themes).await?;
        let insights = self.identify_insights(&content, &quotes).await?;
        let summary = self.summarize(&insights).await?;

        let avg_confidence = if insights.is_empty() {
            0.0
        } else {
            insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64
        };

        let processed = ProcessedSource {
            source_id: source_id.to_string(),
            content_type: plan.content_type,
            confidence_score: avg_confidence,
            domain_tags: plan.key_areas,
            processed_at: Utc::now(),
            potential_clarifications: insights
                .iter()
                .flat_map(|i| i.related_insights.iter().cloned())
                .collect(),
            key_insights: insights,
            major_themes: plan.priority_themes,
            quotes,
            summary,
        };

        self.processed_sources
            .write()
            .unwrap()
            .insert(source_id.to_string(), processed.clone());

        Ok(processed)
    }

    /// Process a batch of (source id, url) pairs. A failed source is logged
    /// and skipped; it never aborts the batch.
    pub async fn process_all_sources(
        &self,
        sources: &[(SourceId, String)],
    ) -> HashMap<SourceId, ProcessedSource> {
        let mut results = HashMap::new();
        for (source_id, url) in sources {
            match self.process_source(source_id, url).await {
                Ok(processed) => {
                    results.insert(source_id.clone(), processed);
                }
                Err(e) => {
                    log::warn!("skipping source {source_id} ({url}): {e}");
                }
            }
        }
        results
    }

    /// Answer a clarification query about a processed source. Answers are
    /// verified by a second completion call and cached only when the
    /// verification confidence clears the threshold. Completion failures
    /// come back as a descriptive answer string, never an `Err`, so batch
    /// dispatch survives one bad agent.
    pub async fn get_clarification(
        &self,
        query: &str,
        source_id: &str,
    ) -> Result<String, Error> {
        let source = self
            .processed(source_id)
            .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))?;

        let cache_key = (source_id.to_string(), query.to_string());
        if let Some(cached) = self.clarification_cache.read().unwrap().get(&cache_key) {
            return Ok(cached.clone());
        }

        let prompt = self.clarification_prompt(query, &source);
        let clarification = match self
            .completion
            .complete(
                vec![Message::system(&self.meta_prompt), Message::user(prompt)],
                CompletionOptions {
                    max_tokens: CLARIFICATION_MAX_TOKENS,
                    temperature: CLARIFICATION_TEMPERATURE,
                    json: false,
                },
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("clarification failed for source {source_id}: {e}");
                return Ok(format!("Error clarifying source {source_id}: {e}"));
            }
        };

        let confidence = self.verify_clarification(query, &clarification).await;
        if confidence >= CLARIFICATION_CACHE_THRESHOLD {
            self.clarification_cache
                .write()
                .unwrap()
                .insert(cache_key, clarification.clone());
        }

        Ok(clarification)
    }

    async fn plan_exploration(&self, content: &str) -> Result<ExplorationPlan, Error> {
        let preview: String = content.chars().take(1000).collect();
        let prompt = format!(
            "Create an exploration plan for analyzing this content.\n\n\
             Content preview: {preview}\n\n\
             Role context: {}\n\
             Objectives: {}\n\n\
             Return a JSON object with fields: \"content_type\" (string), \
             \"key_areas\" (array of strings), \"priority_themes\" (array of strings).",
            self.role_context,
            self.objectives.join("; "),
        );

        let raw = self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(PLAN_MAX_TOKENS, EXPLORATION_TEMPERATURE),
            )
            .await
            .map_err(Error::Completion)?;

        Ok(parse_structured::<ExplorationPlan>(&raw).unwrap_or_else(|e| {
            log::warn!("exploration plan unparseable, using defaults: {e}");
            ExplorationPlan::default()
        }))
    }

    async fn extract_quotes(
        &self,
        content: &str,
        themes: &[String],
    ) -> Result<Vec<ProcessedQuote>, Error> {
        let prompt = format!(
            "Extract key quotes from the content below. For each quote include \
             surrounding context, a relevance score (0-1), and related themes. \
             Only include quotes with relevance above {QUOTE_RELEVANCE_THRESHOLD}.\n\n\
             Content: {content}\n\
             Themes to consider: {}\n\n\
             Return a JSON object: {{\"quotes\": [{{\"content\", \"context\", \
             \"relevance\", \"themes\"}}]}}.",
            themes.join(", "),
        );

        let raw = self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(ANALYSIS_MAX_TOKENS, EXPLORATION_TEMPERATURE),
            )
            .await
            .map_err(Error::Completion)?;

        Ok(parse_structured::<QuoteSheet>(&raw)
            .unwrap_or_else(|e| {
                log::warn!("quote sheet unparseable, dropping quotes: {e}");
                QuoteSheet::default()
            })
            .quotes)
    }

    async fn identify_insights(
        &self,
        content: &str,
        quotes: &[ProcessedQuote],
    ) -> Result<Vec<SourceInsight>, Error> {
        let quotes_json = serde_json::to_string(quotes).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "Based on the content and extracted quotes, identify key insights that \
             address the objectives, carry confidence above \
             {INSIGHT_CONFIDENCE_THRESHOLD}, are supported by quotes, and connect \
             to broader themes. Suggest related areas to explore.\n\n\
             Content: {content}\n\
             Quotes: {quotes_json}\n\
             Objectives: {}\n\n\
             Return a JSON object: {{\"insights\": [{{\"content\", \"confidence\", \
             \"related_insights\", \"supporting_quotes\", \"themes\"}}]}}.",
            self.objectives.join("; "),
        );

        let raw = self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(ANALYSIS_MAX_TOKENS, EXPLORATION_TEMPERATURE),
            )
            .await
            .map_err(Error::Completion)?;

        Ok(parse_structured::<InsightSheet>(&raw)
            .unwrap_or_else(|e| {
                log::warn!("insight sheet unparseable, dropping insights: {e}");
                InsightSheet::default()
            })
            .insights)
    }

    async fn summarize(&self, insights: &[SourceInsight]) -> Result<String, Error> {
        let insights_json = serde_json::to_string(insights).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "Create a brief summary of this source based on the extracted insights. \
             Focus on findings relevant to the objectives.\n\nInsights: {insights_json}"
        );

        self.completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions {
                    max_tokens: SUMMARY_MAX_TOKENS,
                    temperature: EXPLORATION_TEMPERATURE,
                    json: false,
                },
            )
            .await
            .map_err(Error::Completion)
    }

    fn clarification_prompt(&self, query: &str, source: &ProcessedSource) -> String {
        let query_lower = query.to_lowercase();

        let relevant_insights: Vec<&SourceInsight> = source
            .key_insights
            .iter()
            .filter(|i| i.themes.iter().any(|t| query_lower.contains(&t.to_lowercase())))
            .collect();
        let relevant_quotes: Vec<&ProcessedQuote> = source
            .quotes
            .iter()
            .filter(|q| q.themes.iter().any(|t| query_lower.contains(&t.to_lowercase())))
            .collect();

        let insights_json =
            serde_json::to_string_pretty(&relevant_insights).unwrap_or_else(|_| "[]".to_string());
        let quotes_json =
            serde_json::to_string_pretty(&relevant_quotes).unwrap_or_else(|_| "[]".to_string());

        format!(
            "Answer this clarification request about source {}.\n\n\
             Query: {query}\n\n\
             Source summary: {}\n\n\
             Relevant insights:\n{insights_json}\n\n\
             Supporting quotes:\n{quotes_json}\n\n\
             Answer specifically from source content, support claims with quotes, \
             note uncertainty, and only include high-confidence information.",
            source.source_id, source.summary,
        )
    }

    /// Second-pass quality check on a clarification answer. Any failure here
    /// means the answer just goes uncached.
    async fn verify_clarification(&self, query: &str, clarification: &str) -> f64 {
        let prompt = format!(
            "Verify this clarification response.\n\n\
             Original query: {query}\n\
             Response: {clarification}\n\n\
             Check that it directly answers the query, is supported by source \
             content, and qualifies its confidence. Return a JSON object: \
             {{\"confidence\": <0-1>, \"issues\": [..]}}."
        );

        let raw = match self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(VERIFICATION_MAX_TOKENS, EXPLORATION_TEMPERATURE),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("clarification verification failed: {e}");
                return 0.0;
            }
        };

        parse_structured::<Verification>(&raw)
            .map(|v| v.confidence)
            .unwrap_or(0.0)
    }
}
