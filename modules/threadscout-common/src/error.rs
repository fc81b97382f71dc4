use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ThreadScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Session {0} has not finished yet")]
    SessionNotFinished(Uuid),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Failure of an analysis request. Always surfaced to the caller; never
/// replaced by an empty summary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Analysis endpoint is not configured: {0}")]
    NotConfigured(String),

    #[error("No records to analyze")]
    NoRecords,

    #[error("Analysis endpoint rejected credentials: {0}")]
    Auth(String),

    #[error("Analysis quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Analysis request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Analysis endpoint unavailable after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),
}

impl AnalysisError {
    /// Short machine-readable name for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::NotConfigured(_) => "not_configured",
            AnalysisError::NoRecords => "no_records",
            AnalysisError::Auth(_) => "auth",
            AnalysisError::QuotaExceeded(_) => "quota_exceeded",
            AnalysisError::Rejected { .. } => "rejected",
            AnalysisError::Transient { .. } => "transient",
            AnalysisError::InvalidResponse(_) => "invalid_response",
        }
    }
}
