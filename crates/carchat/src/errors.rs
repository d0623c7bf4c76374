use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("not found")]
    NotFound,

    #[error("car data request failed: {0}")]
    Upstream(String),

    #[error("tool loop limit exceeded after {0} model calls")]
    ToolLoopLimitExceeded(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// The object handed back to the model when a tool fails
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Upstream(format!("{:#}", err))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
