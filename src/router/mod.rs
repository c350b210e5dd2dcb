pub mod assign;
pub mod cluster;
pub mod rerank;

pub use assign::assign_agents;
pub use cluster::{cluster_by_theme, consolidate_themes};
pub use rerank::{rerank_sources, thematic_keywords};

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::{CleanedSource, SourceId, WritingContext};

/// Minimum quality score (0-1) for a source to survive filtering.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.6;
pub const MIN_SOURCE_AGENTS: usize = 3;
pub const MAX_SOURCE_AGENTS: usize = 15;

/// Quality control, thematic clustering, and agent assignment over cleaned
/// sources. Pure function of its inputs: same sources and query always
/// produce the same context (modulo the generated context id).
pub fn route_and_cluster(
    sources: Vec<(SourceId, CleanedSource)>,
    refined_query: &str,
    threshold: Option<f64>,
) -> WritingContext {
    let threshold = threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD);

    let ranked = rerank_sources(sources, refined_query, threshold);
    let clusters = cluster_by_theme(&ranked);
    let assignments = assign_agents(&clusters, &ranked);

    let ranked_order: Vec<SourceId> = ranked.iter().map(|(id, _)| id.clone()).collect();
    let sources: HashMap<SourceId, CleanedSource> = ranked.into_iter().collect();

    WritingContext {
        context_id: generate_context_id(),
        refined_query: refined_query.to_string(),
        ranked_order,
        sources,
        thematic_clusters: clusters,
        agent_assignments: assignments,
    }
}

fn generate_context_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let random_part = Uuid::new_v4().simple().to_string();
    format!("write_{}_{}", timestamp, &random_part[..8])
}
