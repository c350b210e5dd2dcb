use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::agent::SourceAgent;
use crate::error::Error;
use crate::types::{AgentId, ClarificationRequest, ClarificationResponse, SourceId};

pub const DEFAULT_MAX_PARALLEL_QUERIES: usize = 5;

/// Smoothing factor for the exponential moving average of response times.
const EMA_ALPHA: f64 = 0.1;
const UNHEALTHY_INACTIVE_SECS: i64 = 3600;
const UNHEALTHY_AVG_RESPONSE_SECS: f64 = 30.0;

/// Tracked state and performance of one registered agent. Mutated only
/// inside the director's dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub assigned_sources: Vec<SourceId>,
    pub active_queries: usize,
    pub completed_queries: u64,
    pub avg_response_time_secs: f64,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub source_id: SourceId,
    pub query: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub completed_queries: u64,
    pub avg_response_time_secs: f64,
    pub current_load: usize,
}

/// Registry and dispatcher over a set of source agents.
///
/// Owns the single concurrency-control point for the whole system: every
/// agent query acquires a permit from one global semaphore before dispatch,
/// bounding total in-flight work system-wide rather than per agent. The
/// director instance is owned by the orchestration caller and passed by
/// handle; nothing here lives in process-wide state.
pub struct Director {
    agents: RwLock<HashMap<AgentId, Arc<SourceAgent>>>,
    states: RwLock<HashMap<AgentId, AgentStatus>>,
    assignments: RwLock<HashMap<SourceId, AgentId>>,
    history: Mutex<Vec<QueryRecord>>,
    semaphore: Arc<Semaphore>,
    max_parallel_queries: usize,
    query_timeout: Option<Duration>,
}

impl Director {
    pub fn new(max_parallel_queries: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(max_parallel_queries)),
            max_parallel_queries,
            query_timeout: None,
        }
    }

    /// Deadline applied around each dispatched agent call. A timed-out query
    /// degrades to a zero-confidence response instead of hanging the batch.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Register an agent and record its source assignment. Source-to-agent
    /// assignment is injective: re-registering a source that another agent
    /// already owns is rejected.
    pub fn register_agent(
        &self,
        agent_id: &str,
        agent: Arc<SourceAgent>,
        assigned_sources: Vec<SourceId>,
    ) -> Result<(), Error> {
        {
            let assignments = self.assignments.read().unwrap();
            for source_id in &assigned_sources {
                if let Some(owner) = assignments.get(source_id) {
                    if owner != agent_id {
                        return Err(Error::DuplicateAssignment {
                            source_id: source_id.clone(),
                            owner: owner.clone(),
                        });
                    }
                }
            }
        }

        self.agents
            .write()
            .unwrap()
            .insert(agent_id.to_string(), agent);
        self.states.write().unwrap().insert(
            agent_id.to_string(),
            AgentStatus {
                agent_id: agent_id.to_string(),
                assigned_sources: assigned_sources.clone(),
                active_queries: 0,
                completed_queries: 0,
                avg_response_time_secs: 0.0,
                last_active: Utc::now(),
            },
        );

        let mut assignments = self.assignments.write().unwrap();
        for source_id in assigned_sources {
            assignments.insert(source_id, agent_id.to_string());
        }
        Ok(())
    }

    pub fn agent_for_source(&self, source_id: &str) -> Option<AgentId> {
        self.assignments.read().unwrap().get(source_id).cloned()
    }

    /// Route a clarification request to the agent owning the source.
    ///
    /// Routing violations fail fast before any permit is taken. Agent-level
    /// failures inside the dispatch degrade to a zero-confidence response so
    /// sibling requests in a batch keep going.
    pub async fn get_clarification(
        &self,
        request: &ClarificationRequest,
    ) -> Result<ClarificationResponse, Error> {
        let agent = self
            .agents
            .read()
            .unwrap()
            .get(&request.agent_id)
            .cloned()
            .ok_or_else(|| Error::UnknownAgent(request.agent_id.clone()))?;

        let assigned = self.agent_for_source(&request.source_id);
        if assigned.as_deref() != Some(request.agent_id.as_str()) {
            return Err(Error::MisroutedRequest {
                agent_id: request.agent_id.clone(),
                source_id: request.source_id.clone(),
            });
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("dispatch semaphore closed");

        self.adjust_active(&request.agent_id, 1);
        let start = Instant::now();
        let response = self.dispatch(&agent, request).await;
        let elapsed = start.elapsed().as_secs_f64();
        self.adjust_active(&request.agent_id, -1);

        self.record_completion(&request.agent_id, elapsed);
        self.history.lock().unwrap().push(QueryRecord {
            timestamp: Utc::now(),
            agent_id: request.agent_id.clone(),
            source_id: request.source_id.clone(),
            query: request.query.clone(),
            success: response.confidence > 0.0,
        });

        Ok(response)
    }

    async fn dispatch(
        &self,
        agent: &Arc<SourceAgent>,
        request: &ClarificationRequest,
    ) -> ClarificationResponse {
        let call = agent.get_clarification(&request.query, &request.source_id);
        let outcome = match self.query_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "query to agent {} timed out after {:?}",
                        request.agent_id,
                        timeout
                    );
                    return self.degraded_response(request, "query timed out");
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(clarification) => ClarificationResponse {
                agent_id: request.agent_id.clone(),
                source_id: request.source_id.clone(),
                clarification,
                confidence: agent.confidence(&request.source_id).unwrap_or(0.5),
                supporting_quotes: agent.supporting_quotes(&request.source_id),
            },
            Err(e) => {
                log::warn!("agent {} failed on {}: {e}", request.agent_id, request.source_id);
                self.degraded_response(request, &e.to_string())
            }
        }
    }

    fn degraded_response(
        &self,
        request: &ClarificationRequest,
        reason: &str,
    ) -> ClarificationResponse {
        ClarificationResponse {
            agent_id: request.agent_id.clone(),
            source_id: request.source_id.clone(),
            clarification: format!("Error: {reason}"),
            confidence: 0.0,
            supporting_quotes: Vec::new(),
        }
    }

    /// Fan out a batch of requests, bounded by the shared semaphore. A failed
    /// request surfaces as `None` at its position; siblings are unaffected.
    pub async fn process_parallel_queries(
        &self,
        requests: &[ClarificationRequest],
    ) -> Vec<Option<ClarificationResponse>> {
        let futures = requests.iter().map(|request| async move {
            match self.get_clarification(request).await {
                Ok(response) => Some(response),
                Err(e) => {
                    log::warn!("clarification request dropped: {e}");
                    None
                }
            }
        });
        join_all(futures).await
    }

    fn adjust_active(&self, agent_id: &str, delta: isize) {
        let mut states = self.states.write().unwrap();
        if let Some(state) = states.get_mut(agent_id) {
            state.active_queries = state.active_queries.saturating_add_signed(delta);
        }
    }

    fn record_completion(&self, agent_id: &str, elapsed_secs: f64) {
        let mut states = self.states.write().unwrap();
        if let Some(state) = states.get_mut(agent_id) {
            state.completed_queries += 1;
            state.avg_response_time_secs =
                (1.0 - EMA_ALPHA) * state.avg_response_time_secs + EMA_ALPHA * elapsed_secs;
            state.last_active = Utc::now();
        }
    }

    pub fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.states.read().unwrap().get(agent_id).cloned()
    }

    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.states
            .read()
            .unwrap()
            .get(agent_id)
            .map(|state| AgentPerformance {
                completed_queries: state.completed_queries,
                avg_response_time_secs: state.avg_response_time_secs,
                current_load: state.active_queries,
            })
    }

    pub fn query_history(&self) -> Vec<QueryRecord> {
        self.history.lock().unwrap().clone()
    }

    /// Advisory health snapshot of every registered agent. Unhealthy agents
    /// are reported but not excluded from dispatch.
    pub fn check_agent_health(&self) -> HashMap<AgentId, bool> {
        let now = Utc::now();
        self.states
            .read()
            .unwrap()
            .iter()
            .map(|(id, state)| (id.clone(), is_healthy(state, now, self.max_parallel_queries)))
            .collect()
    }
}

fn is_healthy(state: &AgentStatus, now: DateTime<Utc>, parallel_cap: usize) -> bool {
    let inactive_secs = (now - state.last_active).num_seconds();
    inactive_secs < UNHEALTHY_INACTIVE_SECS
        && state.avg_response_time_secs < UNHEALTHY_AVG_RESPONSE_SECS
        && state.active_queries < parallel_cap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::extractor::mock::MockExtractor;
    use crate::providers::llm::mock::MockCompletionProvider;
    use crate::providers::llm::{CompletionOptions, CompletionProvider, Message};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that tracks how many completions run at once.
    struct GaugeProvider {
        current: AtomicUsize,
        pub peak: AtomicUsize,
    }

    impl GaugeProvider {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for GaugeProvider {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _options: CompletionOptions,
        ) -> Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("{}".to_string())
        }
    }

    async fn processed_agent(provider: Arc<dyn CompletionProvider>) -> Arc<SourceAgent> {
        let extractor = MockExtractor::new().with_page("http://s1", "content");
        let agent = Arc::new(SourceAgent::new(
            provider,
            Arc::new(extractor),
            "analyst",
            "research",
            vec![],
        ));
        agent.process_source("s1", "http://s1").await.unwrap();
        agent
    }

    fn request(agent_id: &str, source_id: &str, query: &str) -> ClarificationRequest {
        ClarificationRequest {
            agent_id: agent_id.to_string(),
            source_id: source_id.to_string(),
            query: query.to_string(),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_source_assignment() {
        let provider = Arc::new(MockCompletionProvider::new("{}"));
        let director = Director::new(5);
        let agent = processed_agent(provider).await;

        director
            .register_agent("agent_1", agent.clone(), vec!["s1".to_string()])
            .unwrap();
        let result = director.register_agent("agent_2", agent, vec!["s1".to_string()]);

        assert!(matches!(result, Err(Error::DuplicateAssignment { .. })));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_routing_error() {
        let director = Director::new(5);
        let result = director.get_clarification(&request("ghost", "s1", "q")).await;
        assert!(matches!(result, Err(Error::UnknownAgent(_))));
    }

    #[tokio::test]
    async fn test_misrouted_source_rejected() {
        let provider = Arc::new(MockCompletionProvider::new("{}"));
        let director = Director::new(5);
        let agent = processed_agent(provider).await;
        director
            .register_agent("agent_1", agent, vec!["s1".to_string(), "s2".to_string()])
            .unwrap();

        let result = director.get_clarification(&request("agent_1", "s3", "q")).await;

        assert!(matches!(
            result,
            Err(Error::MisroutedRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_semaphore_bounds_in_flight_queries() {
        let gauge = Arc::new(GaugeProvider::new());
        let director = Director::new(5);
        let agent = processed_agent(gauge.clone()).await;
        director
            .register_agent("agent_1", agent, vec!["s1".to_string()])
            .unwrap();

        // Distinct queries so the clarification cache never short-circuits.
        let requests: Vec<ClarificationRequest> = (0..20)
            .map(|i| request("agent_1", "s1", &format!("question {i}")))
            .collect();
        let responses = director.process_parallel_queries(&requests).await;

        assert_eq!(responses.len(), 20);
        assert!(responses.iter().all(|r| r.is_some()));
        // The 4 processing completions ran before dispatch; under dispatch
        // at most 5 queries hold permits at once.
        assert!(gauge.peak.load(Ordering::SeqCst) <= 5);

        let status = director.agent_status("agent_1").unwrap();
        assert_eq!(status.completed_queries, 20);
        assert_eq!(status.active_queries, 0);
        assert!(status.avg_response_time_secs > 0.0);
        assert_eq!(director.query_history().len(), 20);
    }

    #[tokio::test]
    async fn test_parallel_queries_surface_failures_positionally() {
        let provider = Arc::new(MockCompletionProvider::new("{}"));
        let director = Director::new(5);
        let agent = processed_agent(provider).await;
        director
            .register_agent("agent_1", agent, vec!["s1".to_string()])
            .unwrap();

        let requests = vec![
            request("agent_1", "s1", "valid"),
            request("agent_1", "s9", "misrouted"),
            request("agent_1", "s1", "also valid"),
        ];
        let responses = director.process_parallel_queries(&requests).await;

        assert!(responses[0].is_some());
        assert!(responses[1].is_none());
        assert!(responses[2].is_some());
    }

    #[tokio::test]
    async fn test_agent_failure_degrades_not_errors() {
        // Agent processing succeeds on scripted responses, then every
        // clarification call fails at the provider.
        let provider = Arc::new(MockCompletionProvider::new("{}").failing_when_exhausted());
        provider.push("{}");
        provider.push("{}");
        provider.push("{}");
        provider.push("summary");
        let director = Director::new(5);
        let agent = processed_agent(provider).await;
        director
            .register_agent("agent_1", agent, vec!["s1".to_string()])
            .unwrap();

        let response = director
            .get_clarification(&request("agent_1", "s1", "q"))
            .await
            .unwrap();

        // The agent itself synthesizes an error answer; confidence comes
        // from the processed source analysis.
        assert!(response.clarification.contains("Error"));
        let history = director.query_history();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_health_thresholds() {
        let healthy = AgentStatus {
            agent_id: "a".to_string(),
            assigned_sources: vec![],
            active_queries: 0,
            completed_queries: 10,
            avg_response_time_secs: 1.0,
            last_active: Utc::now(),
        };
        let now = Utc::now();
        assert!(is_healthy(&healthy, now, 5));

        let stale = AgentStatus {
            last_active: now - ChronoDuration::seconds(3601),
            ..healthy.clone()
        };
        assert!(!is_healthy(&stale, now, 5));

        let slow = AgentStatus {
            avg_response_time_secs: 30.0,
            ..healthy.clone()
        };
        assert!(!is_healthy(&slow, now, 5));

        let overloaded = AgentStatus {
            active_queries: 5,
            ..healthy
        };
        assert!(!is_healthy(&overloaded, now, 5));
    }

    #[tokio::test]
    async fn test_query_timeout_degrades_response() {
        /// Fast for the first four calls (source processing), slow after.
        struct SlowAfterProcessing {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl CompletionProvider for SlowAfterProcessing {
            async fn complete(
                &self,
                _messages: Vec<Message>,
                _options: CompletionOptions,
            ) -> Result<String> {
                if self.calls.fetch_add(1, Ordering::SeqCst) >= 4 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok("{}".to_string())
            }
        }

        let provider = Arc::new(SlowAfterProcessing {
            calls: AtomicUsize::new(0),
        });
        let agent = processed_agent(provider).await;

        let director = Director::new(5).with_query_timeout(Duration::from_millis(30));
        director
            .register_agent("agent_1", agent, vec!["s1".to_string()])
            .unwrap();

        let response = director
            .get_clarification(&request("agent_1", "s1", "q"))
            .await
            .unwrap();

        assert!(response.clarification.contains("timed out"));
        assert_eq!(response.confidence, 0.0);
    }
}
