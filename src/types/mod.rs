pub mod context;
pub mod draft;
pub mod source;

pub use context::{AgentAssignment, ClarificationRequest, ClarificationResponse, WritingContext};
pub use draft::{
    DraftEvaluation, DraftState, QualityScore, ReportDraft, ReportSection, SourceReference,
    WriterOutcome,
};
pub use source::{
    CleanedSource, ExplorationPlan, ProcessedQuote, ProcessedSource, SourceInsight, SourceMetadata,
};

use serde::{Deserialize, Serialize};

pub type SourceId = String;
pub type AgentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Twitter,
    Academic,
    News,
    Blog,
    Forum,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Web => "web",
            SourceType::Twitter => "twitter",
            SourceType::Academic => "academic",
            SourceType::News => "news",
            SourceType::Blog => "blog",
            SourceType::Forum => "forum",
            SourceType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRelevance {
    High,
    Medium,
    Low,
    Irrelevant,
}

impl SourceRelevance {
    /// Numeric weight used by the reranking score.
    pub fn numeric(&self) -> f64 {
        match self {
            SourceRelevance::High => 1.0,
            SourceRelevance::Medium => 0.7,
            SourceRelevance::Low => 0.4,
            SourceRelevance::Irrelevant => 0.0,
        }
    }
}
