use thiserror::Error;

/// The single error type shared across every `docgraph-*` crate.
#[derive(Error, Debug)]
pub enum DocgraphError {
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("dependency cycle could not be broken: {0:?}")]
    UnbreakableCycle(Vec<String>),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("LLM response did not contain a usable {0} block")]
    MalformedAgentResponse(&'static str),

    #[error("rate limit budget exhausted for provider {0}")]
    RateLimited(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("external retrieval error: {0}")]
    ExternalRetrieval(String),

    #[error("writeback error for {0}: {1}")]
    Writeback(String, String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DocgraphError>;
