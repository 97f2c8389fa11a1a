use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure, throttling or a 5xx from an external service.
    #[error("Transient {service} error: {message}")]
    Transient { service: String, message: String },

    /// The external service refused the request; retrying will not help.
    #[error("{service} rejected request: {message}")]
    Rejected { service: String, message: String },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Circuit open for {0}")]
    CircuitOpen(String),

    #[error("{service} call timed out after {after_ms}ms")]
    Timeout { service: String, after_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Whether this failure says something about the health of the remote
    /// service, and therefore counts toward opening a circuit.
    pub fn trips_circuit(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Transient { .. } => "transient",
            Self::Rejected { .. } => "rejected",
            Self::MalformedOutput(_) => "malformed_output",
            Self::CircuitOpen(_) => "circuit_open",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CampaignError::transient("google_ads", "503").is_retryable());
        assert!(CampaignError::Timeout {
            service: "openai".into(),
            after_ms: 10
        }
        .is_retryable());
        assert!(!CampaignError::rejected("google_ads", "invalid budget").is_retryable());
        assert!(!CampaignError::MalformedOutput("missing field".into()).is_retryable());
        assert!(!CampaignError::Validation("bad".into()).trips_circuit());
    }

    #[test]
    fn test_error_display() {
        let err = CampaignError::rejected("google_ads", "BUDGET_AMOUNT_TOO_SMALL");
        assert_eq!(
            err.to_string(),
            "google_ads rejected request: BUDGET_AMOUNT_TOO_SMALL"
        );
        assert_eq!(err.kind(), "rejected");
    }
}
