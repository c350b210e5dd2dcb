use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::director::Director;
use crate::error::Error;
use crate::providers::llm::{parse_structured, CompletionOptions, CompletionProvider, Message};
use crate::types::{
    ClarificationRequest, DraftEvaluation, DraftState, ReportDraft, SourceId, WriterOutcome,
    WritingContext,
};

/// Hard cap on revision passes for one generation call.
const MAX_DRAFT_ITERATIONS: u32 = 5;

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const DRAFT_TEMPERATURE: f32 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 4096;
const DRAFT_MAX_TOKENS: u32 = 8192;
const EVALUATION_MAX_TOKENS: u32 = 2048;

/// Advisory document-level quality floors. The evaluator's own
/// `meets_threshold` boolean is the authoritative gate; these numbers are
/// surfaced in the evaluation prompt as guidance.
const COVERAGE_FLOOR: f64 = 0.8;
const DEPTH_FLOOR: f64 = 0.7;
const COHERENCE_FLOOR: f64 = 0.75;
const CITATION_FLOOR: f64 = 0.9;

#[derive(Debug, Deserialize, Default)]
struct SourceAnalysis {
    #[serde(default)]
    key_information: Vec<KeyInformation>,
    #[serde(default)]
    contradictions: Vec<Contradiction>,
    #[serde(default)]
    clarification_needed: Vec<ClarificationNeed>,
    #[serde(default)]
    connections: Vec<Connection>,
}

#[derive(Debug, Deserialize)]
struct KeyInformation {
    content: String,
    #[serde(default)]
    theme: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contradiction {
    content: String,
    #[serde(default)]
    source_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Connection {
    content: String,
    #[serde(default)]
    source_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClarificationNeed {
    question: String,
    #[serde(default = "default_priority")]
    priority: u32,
}

fn default_priority() -> u32 {
    3
}

struct GatheredClarification {
    source_id: SourceId,
    query: String,
    answer: String,
}

/// Drives one generation call through explore, clarify, draft, and the
/// evaluate/revise loop, degrading gracefully on partial failure. Owns no
/// cross-call state; the director handle and writing context arrive from the
/// caller.
pub struct WriterOrchestrator {
    completion: Arc<dyn CompletionProvider>,
}

impl WriterOrchestrator {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self { completion }
    }

    /// Generate a quality-gated report draft for the given writing context.
    pub async fn generate_draft(
        &self,
        context: &WritingContext,
        director: &Director,
    ) -> WriterOutcome {
        let analyses = self.explore_sources(context).await;
        let clarifications = self.request_clarifications(context, director, &analyses).await;

        let mut state = DraftState {
            iteration: 0,
            draft: self.draft_initial(context, &analyses, &clarifications).await,
            evaluation: None,
        };

        while state.iteration < MAX_DRAFT_ITERATIONS {
            let evaluation = self.evaluate_draft(&state.draft).await;
            let meets = evaluation.meets_threshold;
            state.evaluation = Some(evaluation);

            if meets {
                break;
            }

            state.draft = self.revise_draft(&state.draft, state.evaluation.as_ref()).await;
            state.iteration += 1;
        }

        let improvements_needed = match &state.evaluation {
            Some(evaluation) if !evaluation.meets_threshold => {
                evaluation.improvements_needed.clone()
            }
            _ => Vec::new(),
        };

        WriterOutcome {
            draft_id: generate_draft_id(),
            draft: state.draft,
            improvements_needed,
        }
    }

    /// Analyze every ranked source concurrently. A failed analysis drops that
    /// source's contribution; the batch never aborts.
    async fn explore_sources(
        &self,
        context: &WritingContext,
    ) -> HashMap<SourceId, SourceAnalysis> {
        let futures = context.ranked_sources().map(|(id, source)| {
            let id = id.clone();
            let content = source.content.clone();
            async move {
                match self.analyze_source(&id, &content).await {
                    Ok(analysis) => Some((id, analysis)),
                    Err(e) => {
                        log::warn!("dropping analysis of source {id}: {e}");
                        None
                    }
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }

    async fn analyze_source(
        &self,
        source_id: &str,
        content: &str,
    ) -> Result<SourceAnalysis, Error> {
        let prompt = format!(
            "You are analyzing source material for a research report.\n\n\
             Source {source_id}:\n{content}\n\n\
             Identify the most relevant information, note contradictions with \
             other sources, flag questions that need clarification from the \
             agent owning this source, and note connections to other sources.\n\n\
             Return a JSON object: {{\"key_information\": [{{\"content\", \
             \"relevance\", \"theme\"}}], \"contradictions\": [{{\"content\", \
             \"source_ids\"}}], \"clarification_needed\": [{{\"question\", \
             \"priority\"}}], \"connections\": [{{\"content\", \
             \"source_ids\"}}]}}. Priority is 1-5, 1 most urgent."
        );

        let raw = self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(ANALYSIS_MAX_TOKENS, ANALYSIS_TEMPERATURE),
            )
            .await
            .map_err(Error::Completion)?;

        parse_structured::<SourceAnalysis>(&raw)
    }

    /// Turn flagged knowledge gaps into clarification requests, grouped by
    /// owning agent. Within one agent's batch requests run sequentially in
    /// ascending priority order; batches across agents run concurrently.
    async fn request_clarifications(
        &self,
        context: &WritingContext,
        director: &Director,
        analyses: &HashMap<SourceId, SourceAnalysis>,
    ) -> Vec<GatheredClarification> {
        let mut batches: HashMap<String, Vec<(u32, ClarificationRequest)>> = HashMap::new();

        for (source_id, analysis) in analyses {
            let Some(assignment) = context.owning_agent(source_id) else {
                continue;
            };
            for need in &analysis.clarification_needed {
                batches.entry(assignment.agent_id.clone()).or_default().push((
                    need.priority,
                    ClarificationRequest {
                        agent_id: assignment.agent_id.clone(),
                        source_id: source_id.clone(),
                        query: need.question.clone(),
                        context: None,
                    },
                ));
            }
        }

        let batch_futures = batches.into_values().map(|mut batch| async move {
            batch.sort_by_key(|(priority, _)| *priority);
            let mut gathered = Vec::new();
            for (_, request) in batch {
                match director.get_clarification(&request).await {
                    Ok(response) => gathered.push(GatheredClarification {
                        source_id: request.source_id,
                        query: request.query,
                        answer: response.clarification,
                    }),
                    Err(e) => {
                        log::warn!("clarification for {} dropped: {e}", request.source_id);
                    }
                }
            }
            gathered
        });

        join_all(batch_futures).await.into_iter().flatten().collect()
    }

    /// One synthesis call producing the initial structured draft. Any failure
    /// degrades to a placeholder draft that still enters evaluation.
    async fn draft_initial(
        &self,
        context: &WritingContext,
        analyses: &HashMap<SourceId, SourceAnalysis>,
        clarifications: &[GatheredClarification],
    ) -> ReportDraft {
        let prompt = self.draft_prompt(context, analyses, clarifications);
        let result = self
            .completion
            .complete(
                vec![
                    Message::system(
                        "You are an expert research writer synthesizing sources into a \
                         comprehensive, well-cited report.",
                    ),
                    Message::user(prompt),
                ],
                CompletionOptions::structured(DRAFT_MAX_TOKENS, DRAFT_TEMPERATURE),
            )
            .await;

        match result {
            Ok(raw) => match parse_structured::<ReportDraft>(&raw) {
                Ok(draft) => draft,
                Err(e) => {
                    log::warn!("initial draft unparseable: {e}");
                    ReportDraft::placeholder(&context.refined_query, "unparseable synthesis output")
                }
            },
            Err(e) => {
                log::warn!("initial draft synthesis failed: {e}");
                ReportDraft::placeholder(&context.refined_query, &e.to_string())
            }
        }
    }

    fn draft_prompt(
        &self,
        context: &WritingContext,
        analyses: &HashMap<SourceId, SourceAnalysis>,
        clarifications: &[GatheredClarification],
    ) -> String {
        // Keyword frequency across ranked sources, first-seen tiebreak.
        let mut topic_counts: Vec<(String, usize)> = Vec::new();
        for (_, source) in context.ranked_sources() {
            for keyword in &source.keywords {
                let keyword = keyword.to_lowercase();
                match topic_counts.iter_mut().find(|(k, _)| *k == keyword) {
                    Some((_, count)) => *count += 1,
                    None => topic_counts.push((keyword, 1)),
                }
            }
        }
        topic_counts.sort_by(|a, b| b.1.cmp(&a.1));
        let top_topics: Vec<String> = topic_counts
            .into_iter()
            .take(5)
            .map(|(keyword, _)| keyword)
            .collect();

        let (mut high, mut medium, mut low) = (0usize, 0usize, 0usize);
        for (_, source) in context.ranked_sources() {
            let quality = source.metadata.quality_score;
            if quality >= 0.8 {
                high += 1;
            } else if quality >= 0.6 {
                medium += 1;
            } else {
                low += 1;
            }
        }

        let source_lines: Vec<String> = context
            .ranked_sources()
            .map(|(id, source)| {
                format!(
                    "- {id} ({}): {}",
                    source.metadata.source_type.as_str(),
                    source.metadata.title.as_deref().unwrap_or("untitled"),
                )
            })
            .collect();

        let cluster_lines: Vec<String> = context
            .thematic_clusters
            .iter()
            .map(|(theme, members)| format!("- {theme}: {}", members.join(", ")))
            .collect();

        let analysis_lines: Vec<String> = analyses
            .iter()
            .flat_map(|(id, analysis)| {
                analysis
                    .key_information
                    .iter()
                    .map(move |info| match &info.theme {
                        Some(theme) => format!("- [{id}/{theme}] {}", info.content),
                        None => format!("- [{id}] {}", info.content),
                    })
            })
            .collect();

        let contradiction_lines: Vec<String> = analyses
            .values()
            .flat_map(|analysis| {
                analysis
                    .contradictions
                    .iter()
                    .map(|c| format!("- {} (sources: {})", c.content, c.source_ids.join(", ")))
            })
            .collect();

        let connection_lines: Vec<String> = analyses
            .values()
            .flat_map(|analysis| {
                analysis
                    .connections
                    .iter()
                    .map(|c| format!("- {} (sources: {})", c.content, c.source_ids.join(", ")))
            })
            .collect();

        let clarification_lines: Vec<String> = clarifications
            .iter()
            .map(|c| format!("- [{}] Q: {} A: {}", c.source_id, c.query, c.answer))
            .collect();

        format!(
            "Write a comprehensive research report addressing this query:\n\
             {}\n\n\
             Top topics across sources: {}\n\
             Source quality distribution: {high} high, {medium} medium, {low} low\n\n\
             Available sources:\n{}\n\n\
             Thematic organization:\n{}\n\n\
             Key findings from source analysis:\n{}\n\n\
             Noted contradictions:\n{}\n\n\
             Cross-source connections:\n{}\n\n\
             Clarifications from source agents:\n{}\n\n\
             Return a JSON object: {{\"title\", \"summary\", \"sections\": \
             [{{\"title\", \"content\", \"sources\": [{{\"source_id\"}}]}}], \
             \"references\": [{{\"source_id\", \"title\", \"url\"}}], \
             \"keywords\"}}. Cite sources in every section.",
            context.refined_query,
            top_topics.join(", "),
            source_lines.join("\n"),
            cluster_lines.join("\n"),
            analysis_lines.join("\n"),
            contradiction_lines.join("\n"),
            connection_lines.join("\n"),
            clarification_lines.join("\n"),
        )
    }

    /// Evaluate the current draft. Evaluation failure counts as not meeting
    /// the gate, so the loop keeps iterating up to the cap.
    async fn evaluate_draft(&self, draft: &ReportDraft) -> DraftEvaluation {
        let draft_json = serde_json::to_string(draft).unwrap_or_else(|_| "{}".to_string());
        let prompt = format!(
            "Evaluate this research report draft.\n\n{draft_json}\n\n\
             Score each dimension 0-1: coverage (floor {COVERAGE_FLOOR}), depth \
             (floor {DEPTH_FLOOR}), coherence (floor {COHERENCE_FLOOR}), citation \
             completeness (floor {CITATION_FLOOR}). Decide overall whether the \
             draft meets publication quality.\n\n\
             Return a JSON object: {{\"scores\": {{\"coverage\", \"depth\", \
             \"coherence\", \"citation\"}}, \"improvements_needed\": [..], \
             \"meets_threshold\": bool}}."
        );

        let raw = match self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(EVALUATION_MAX_TOKENS, ANALYSIS_TEMPERATURE),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("draft evaluation failed: {e}");
                return DraftEvaluation::failed(&e.to_string());
            }
        };

        parse_structured::<DraftEvaluation>(&raw).unwrap_or_else(|e| {
            log::warn!("draft evaluation unparseable: {e}");
            DraftEvaluation::failed("unparseable evaluation output")
        })
    }

    /// One revision pass. Failure keeps the current draft; the iteration is
    /// still consumed so a broken reviser cannot loop forever.
    async fn revise_draft(
        &self,
        draft: &ReportDraft,
        evaluation: Option<&DraftEvaluation>,
    ) -> ReportDraft {
        let draft_json = serde_json::to_string(draft).unwrap_or_else(|_| "{}".to_string());
        let improvements = evaluation
            .map(|e| e.improvements_needed.join("\n- "))
            .unwrap_or_default();

        let prompt = format!(
            "Revise this research report draft, addressing every improvement \
             point while preserving its core content.\n\n\
             Draft:\n{draft_json}\n\n\
             Improvements needed:\n- {improvements}\n\n\
             Return the complete revised draft as a JSON object with the same \
             shape as the input."
        );

        let result = self
            .completion
            .complete(
                vec![Message::user(prompt)],
                CompletionOptions::structured(DRAFT_MAX_TOKENS, DRAFT_TEMPERATURE),
            )
            .await;

        match result {
            Ok(raw) => match parse_structured::<ReportDraft>(&raw) {
                Ok(revised) => revised,
                Err(e) => {
                    log::warn!("revision unparseable, keeping current draft: {e}");
                    draft.clone()
                }
            },
            Err(e) => {
                log::warn!("revision failed, keeping current draft: {e}");
                draft.clone()
            }
        }
    }
}

fn generate_draft_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let random_part = Uuid::new_v4().simple().to_string();
    format!("draft_{}_{}", timestamp, &random_part[..8])
}
