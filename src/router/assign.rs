use std::collections::{HashMap, HashSet};

use super::{MAX_SOURCE_AGENTS, MIN_SOURCE_AGENTS};
use crate::types::{AgentAssignment, CleanedSource, SourceId, SourceType};

/// Distribute clustered sources across a right-sized pool of agents. Whole
/// themes are assigned atomically to the currently least-loaded agent, so a
/// theme is never split while load stays near-balanced. Sources that fall
/// into no theme are appended afterwards, keeping the assignment an exact
/// partition of the ranked sources.
pub fn assign_agents(
    clusters: &[(String, Vec<SourceId>)],
    ranked: &[(SourceId, CleanedSource)],
) -> Vec<AgentAssignment> {
    if ranked.is_empty() {
        return Vec::new();
    }

    let agent_count = ((clusters.len() + 1) / 2).clamp(MIN_SOURCE_AGENTS, MAX_SOURCE_AGENTS);

    let mut agents: Vec<AgentAssignment> = (0..agent_count)
        .map(|i| AgentAssignment {
            agent_id: format!("agent_{}", i + 1),
            assigned_sources: Vec::new(),
            source_types: Vec::new(),
            priority: (i + 1) as u32,
        })
        .collect();

    let type_of: HashMap<&str, SourceType> = ranked
        .iter()
        .map(|(id, source)| (id.as_str(), source.metadata.source_type))
        .collect();

    let mut themes: Vec<&(String, Vec<SourceId>)> = clusters.iter().collect();
    themes.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut assigned: HashSet<&str> = HashSet::new();

    for (_, theme_sources) in themes {
        let target = least_loaded(&agents);
        for source_id in theme_sources {
            // Clusters may overlap; each source goes to exactly one agent.
            if assigned.insert(source_id.as_str()) {
                push_source(&mut agents[target], source_id, &type_of);
            }
        }
    }

    // Singleton sources outside every theme still need an owner.
    for (source_id, _) in ranked {
        if assigned.insert(source_id.as_str()) {
            let target = least_loaded(&agents);
            push_source(&mut agents[target], source_id, &type_of);
        }
    }

    agents
}

fn least_loaded(agents: &[AgentAssignment]) -> usize {
    let mut best = 0;
    for (i, agent) in agents.iter().enumerate() {
        if agent.assigned_sources.len() < agents[best].assigned_sources.len() {
            best = i;
        }
    }
    best
}

fn push_source(
    agent: &mut AgentAssignment,
    source_id: &SourceId,
    type_of: &HashMap<&str, SourceType>,
) {
    agent.assigned_sources.push(source_id.clone());
    if let Some(source_type) = type_of.get(source_id.as_str()) {
        if !agent.source_types.contains(source_type) {
            agent.source_types.push(*source_type);
        }
    }
}
