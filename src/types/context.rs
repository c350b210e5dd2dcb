use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{AgentId, CleanedSource, SourceId, SourceType};

/// Sources handed to one processing agent. Created by the ranker, consumed
/// by the director at registration, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub agent_id: AgentId,
    pub assigned_sources: Vec<SourceId>,
    pub source_types: Vec<SourceType>,
    /// Lower value = served first.
    pub priority: u32,
}

/// The bundle the ranker produces for the writer: reranked sources in scored
/// order, thematic clusters, and the agent assignments derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingContext {
    pub context_id: String,
    pub refined_query: String,
    /// Source ids in descending score order. The map holds the sources
    /// themselves; the vec preserves the ranking.
    pub ranked_order: Vec<SourceId>,
    pub sources: HashMap<SourceId, CleanedSource>,
    pub thematic_clusters: Vec<(String, Vec<SourceId>)>,
    pub agent_assignments: Vec<AgentAssignment>,
}

impl WritingContext {
    pub fn ranked_sources(&self) -> impl Iterator<Item = (&SourceId, &CleanedSource)> {
        self.ranked_order
            .iter()
            .filter_map(|id| self.sources.get(id).map(|s| (id, s)))
    }

    /// The agent that owns a source, scanning the assignments.
    pub fn owning_agent(&self, source_id: &str) -> Option<&AgentAssignment> {
        self.agent_assignments
            .iter()
            .find(|a| a.assigned_sources.iter().any(|s| s == source_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub agent_id: AgentId,
    pub source_id: SourceId,
    pub query: String,
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationResponse {
    pub agent_id: AgentId,
    pub source_id: SourceId,
    pub clarification: String,
    pub confidence: f64,
    /// Limited to the top 3 quotes.
    pub supporting_quotes: Vec<String>,
}
