use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfsmoke_domain::{EcsCluster, RunId};
use tfsmoke_driver::CommandLog;
use uuid::Uuid;

/// What went wrong between apply and destroy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// `init` or `apply` failed; nothing was queried.
    Apply { message: String },
    /// The cluster was missing or carried the wrong name.
    Verification {
        expected: String,
        actual: Option<String>,
        detail: String,
    },
    /// The apply/verify body panicked.
    Panicked { message: String },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Apply { message } => write!(f, "apply failed: {}", message),
            Failure::Verification { expected, actual: Some(actual), .. } => {
                write!(f, "cluster name mismatch: expected {:?}, got {:?}", expected, actual)
            }
            Failure::Verification { expected, actual: None, detail } => {
                write!(f, "cluster {:?} not found: {}", expected, detail)
            }
            Failure::Panicked { message } => write!(f, "panicked: {}", message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DestroyOutcome {
    Succeeded,
    /// The workspace (and its state file) is kept for manual cleanup.
    Failed {
        message: String,
        retained_workspace: Option<PathBuf>,
    },
}

impl DestroyOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, DestroyOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeReport {
    pub id: Uuid,
    pub run_id: RunId,
    pub test_name: String,
    pub expected_cluster: String,
    pub region: String,
    pub availability_zones: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every engine command that ran, in order, destroy last.
    pub commands: Vec<CommandLog>,
    pub cluster: Option<EcsCluster>,
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub failure: Option<Failure>,
    pub destroy: DestroyOutcome,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.destroy.succeeded()
    }

    /// One-line description of the outcome.
    pub fn summary(&self) -> String {
        match (&self.failure, &self.destroy) {
            (None, DestroyOutcome::Succeeded) => "passed".into(),
            (Some(f), DestroyOutcome::Succeeded) => f.to_string(),
            (None, DestroyOutcome::Failed { message, .. }) => {
                format!("destroy failed: {}", message)
            }
            (Some(f), DestroyOutcome::Failed { message, .. }) => {
                format!("{}; destroy also failed: {}", f, message)
            }
        }
    }
}
