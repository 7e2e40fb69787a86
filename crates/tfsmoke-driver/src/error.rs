use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        log: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("{service} {code}: {message}")]
    Aws {
        service: String,
        code: String,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("region {region} has {found} availability zones, need {required}")]
    InsufficientZones {
        region: String,
        found: usize,
        required: usize,
    },

    #[error("no region available: {0}")]
    NoRegionAvailable(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
