//! Error taxonomy for the pipeline stages.
//!
//! Every stage returns `Result<_, PipelineError>`. Callers decide what is
//! fatal by looking at [`PipelineError::kind`]:
//! - `Connection` / `Transformation`: absorbed by the stage (skip or fallback)
//! - `UnknownEntityType` / `InvalidRecord`: per-record failure, counted
//! - `Egress`: surfaced to the caller of `Streamer::stream`
//! - `Config`: only the agent treats this as fatal

use serde::Serialize;

/// Tag carried by every [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Connection,
    Transformation,
    UnknownEntityType,
    InvalidRecord,
    Egress,
    Config,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("monitoring connection failed for broker {broker_id}: {message}")]
    Connection { broker_id: String, message: String },

    #[error("alternate schema transform failed for {entity}: {message}")]
    Transformation { entity: String, message: String },

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("invalid {entity_type} record: {message}")]
    InvalidRecord { entity_type: String, message: String },

    #[error("egress failed for batch {batch}{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Egress {
        batch: usize,
        status: Option<u16>,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Connection { .. } => ErrorKind::Connection,
            PipelineError::Transformation { .. } => ErrorKind::Transformation,
            PipelineError::UnknownEntityType(_) => ErrorKind::UnknownEntityType,
            PipelineError::InvalidRecord { .. } => ErrorKind::InvalidRecord,
            PipelineError::Egress { .. } => ErrorKind::Egress,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn connection(broker_id: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Connection {
            broker_id: broker_id.into(),
            message: message.to_string(),
        }
    }

    pub fn transformation(entity: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Transformation {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_record(entity_type: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::InvalidRecord {
            entity_type: entity_type.into(),
            message: message.to_string(),
        }
    }

    /// Transport errors and throttling/server statuses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Egress { status: None, .. } => true,
            PipelineError::Egress {
                status: Some(code), ..
            } => *code == 429 || (500..600).contains(code),
            PipelineError::Connection { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
