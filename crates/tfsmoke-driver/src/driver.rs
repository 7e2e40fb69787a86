use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfsmoke_domain::{EcsCluster, EnvOverrides, VarSet};
use uuid::Uuid;

use crate::error::DriverError;

/// Everything a provisioning engine needs for one module invocation.
#[derive(Debug, Clone, Default)]
pub struct TerraformOptions {
    /// Directory holding the module's `.tf` files.
    pub dir: PathBuf,
    /// Passed as `-var` arguments to `apply` and `destroy`.
    pub vars: VarSet,
    /// Layered onto the subprocess environment.
    pub env: EnvOverrides,
}

/// Captured output of one engine sub-command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLog {
    pub id: Uuid,
    /// e.g. `terraform apply`
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
    /// Merged stdout + stderr.
    pub output: String,
}

impl CommandLog {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// The external tool that turns a module plus variables into real resources.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// `init` followed by `apply`. Fails on the first non-zero exit.
    async fn init_and_apply(&self, opts: &TerraformOptions) -> Result<Vec<CommandLog>, DriverError>;

    /// Remove everything the module created.
    async fn destroy(&self, opts: &TerraformOptions) -> Result<CommandLog, DriverError>;

    /// Current module outputs, keyed by output name.
    async fn outputs(
        &self,
        opts: &TerraformOptions,
    ) -> Result<BTreeMap<String, serde_json::Value>, DriverError>;
}

/// Read-only view of the cloud account.
#[async_trait]
pub trait Inventory: Send + Sync + 'static {
    /// Regions enabled for the account.
    async fn enabled_regions(&self) -> Result<Vec<String>, DriverError>;

    /// Availability zone names in `region`, in API order.
    async fn availability_zones(&self, region: &str) -> Result<Vec<String>, DriverError>;

    /// Look up a single ECS cluster by name. Missing clusters are `NotFound`.
    async fn describe_cluster(&self, region: &str, name: &str) -> Result<EcsCluster, DriverError>;
}
