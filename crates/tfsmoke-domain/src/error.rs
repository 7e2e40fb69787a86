use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid run id: {0}")]
    InvalidRunId(String),

    #[error("invalid cluster naming: {0}")]
    InvalidNaming(String),

    #[error("reserved variable '{0}' cannot be overridden")]
    ReservedVariable(String),
}
