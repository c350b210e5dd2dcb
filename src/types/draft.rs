use serde::{Deserialize, Serialize};

use super::SourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub source_id: SourceId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub references: Vec<SourceReference>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ReportDraft {
    /// Minimal draft used when synthesis fails; still goes through the
    /// evaluation loop instead of aborting the generation call.
    pub fn placeholder(title: impl Into<String>, reason: &str) -> Self {
        Self {
            title: title.into(),
            summary: format!("Draft synthesis failed: {reason}. Placeholder draft produced."),
            sections: Vec::new(),
            references: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

/// Four-dimensional quality assessment, each score in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityScore {
    pub coverage: f64,
    pub depth: f64,
    pub coherence: f64,
    pub citation: f64,
}

impl QualityScore {
    pub fn zero() -> Self {
        Self {
            coverage: 0.0,
            depth: 0.0,
            coherence: 0.0,
            citation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEvaluation {
    pub scores: QualityScore,
    #[serde(default)]
    pub improvements_needed: Vec<String>,
    /// The authoritative gate. The numeric thresholds are advisory; this
    /// boolean decides whether iteration stops.
    pub meets_threshold: bool,
}

impl DraftEvaluation {
    pub fn failed(reason: &str) -> Self {
        Self {
            scores: QualityScore::zero(),
            improvements_needed: vec![format!("Evaluation failed: {reason}")],
            meets_threshold: false,
        }
    }
}

/// Working state of one generation call; discarded on completion.
#[derive(Debug, Clone)]
pub struct DraftState {
    pub iteration: u32,
    pub draft: ReportDraft,
    pub evaluation: Option<DraftEvaluation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterOutcome {
    pub draft_id: String,
    pub draft: ReportDraft,
    /// Outstanding evaluator suggestions when the quality gate was never met.
    pub improvements_needed: Vec<String>,
}
