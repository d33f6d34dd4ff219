/// Caller-facing error taxonomy for discussion operations.
/// Classifies failures by what the caller should do next: correct the
/// input, give up, refresh its view, or retry.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DomainError {
    // Surfaced to the caller for correction — never retried
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    Permission(String),

    // Caller should refresh its view
    #[error("not found: {0}")]
    NotFound(String),

    // Retryable
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Transient(String),
}

impl DomainError {
    /// A Conflict is safe to retry once; a Transient failure is safe to
    /// retry with backoff. Everything else must reach the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }

    /// Short classification string for logging and wire error codes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Transient(_) => "transient",
        }
    }
}
