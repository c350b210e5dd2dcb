use thiserror::Error;

/// Domain errors for the report pipeline.
///
/// Collaborator transport failures (`Completion`, `Extraction`) are recovered
/// locally with documented defaults wherever possible; routing errors surface
/// to the caller and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("completion service call failed: {0}")]
    Completion(#[source] anyhow::Error),

    #[error("malformed structured output: {0}")]
    Parse(String),

    #[error("content extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown agent id: {0}")]
    UnknownAgent(String),

    #[error("source {source_id} is not assigned to agent {agent_id}")]
    MisroutedRequest {
        agent_id: String,
        source_id: String,
    },

    #[error("source {0} has not been processed")]
    SourceNotFound(String),

    #[error("source {source_id} is already assigned to agent {owner}")]
    DuplicateAssignment {
        source_id: String,
        owner: String,
    },
}

impl Error {
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Error::UnknownAgent(_)
                | Error::MisroutedRequest { .. }
                | Error::SourceNotFound(_)
                | Error::DuplicateAssignment { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
