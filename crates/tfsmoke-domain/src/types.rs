use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, OnceLock};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Regions ───────────────────────────────────────────────────────────────────

/// Regions considered stable enough to host smoke tests. Candidate lists are
/// intersected with this set before a region is picked.
pub const STABLE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ca-central-1",
    "sa-east-1",
];

pub const DEFAULT_CANDIDATE_REGIONS: &[&str] = &["us-east-1", "eu-west-1"];

/// Environment variable the AWS provider reads to pick its region.
pub const REGION_ENV_VAR: &str = "AWS_DEFAULT_REGION";

/// Variable names the harness always sets itself.
pub const VAR_TEST_NAME: &str = "test_name";
pub const VAR_VPC_AZS: &str = "vpc_azs";

// ── RunId ─────────────────────────────────────────────────────────────────────

const RUN_ID_LEN: usize = 6;
const RUN_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn issued_run_ids() -> &'static Mutex<HashSet<String>> {
    static ISSUED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    ISSUED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Short random identifier embedded in every resource name a run creates.
///
/// Generated ids are lowercase base-36 so they survive every AWS naming rule
/// the module touches. [`RunId::generate`] never hands out the same value twice
/// within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        let mut issued = issued_run_ids()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut rng = rand::thread_rng();
        loop {
            let id: String = (0..RUN_ID_LEN)
                .map(|_| RUN_ID_ALPHABET[rng.gen_range(0..RUN_ID_ALPHABET.len())] as char)
                .collect();
            if issued.insert(id.clone()) {
                return RunId(id);
            }
        }
    }

    /// Wrap a caller-supplied id, e.g. to re-run destroy for a known run.
    pub fn new(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DomainError::InvalidRunId(s));
        }
        Ok(RunId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Naming ────────────────────────────────────────────────────────────────────

/// How the harness derives names from a [`RunId`].
///
/// `test_name` is `{prefix}-{run_id}`. The module names its cluster
/// `{test_name}{cluster_suffix}`, so `cluster_suffix` must track the module's
/// own naming. Nothing checks that coupling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNaming {
    pub prefix: String,
    pub cluster_suffix: String,
}

impl Default for ClusterNaming {
    fn default() -> Self {
        Self {
            prefix: "terratest-aws-ecs-example-cluster".into(),
            cluster_suffix: "-test".into(),
        }
    }
}

impl ClusterNaming {
    pub fn new(prefix: impl Into<String>, cluster_suffix: impl Into<String>) -> Result<Self, DomainError> {
        let prefix = prefix.into();
        let cluster_suffix = cluster_suffix.into();
        if prefix.trim().is_empty() {
            return Err(DomainError::InvalidNaming("prefix must not be empty".into()));
        }
        if cluster_suffix.is_empty() {
            return Err(DomainError::InvalidNaming("cluster suffix must not be empty".into()));
        }
        Ok(Self { prefix, cluster_suffix })
    }

    pub fn test_name(&self, run_id: &RunId) -> String {
        format!("{}-{}", self.prefix, run_id)
    }

    pub fn cluster_name(&self, test_name: &str) -> String {
        format!("{}{}", test_name, self.cluster_suffix)
    }
}

// ── Terraform variables ───────────────────────────────────────────────────────

/// A single Terraform input variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<VarValue>),
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Render as an HCL literal, quoting strings.
    pub fn to_hcl(&self) -> String {
        match self {
            VarValue::Bool(b) => b.to_string(),
            VarValue::Int(i) => i.to_string(),
            VarValue::Float(f) => f.to_string(),
            VarValue::String(s) => hcl_quote(s),
            VarValue::List(items) => {
                let inner: Vec<String> = items.iter().map(VarValue::to_hcl).collect();
                format!("[{}]", inner.join(", "))
            }
            VarValue::Map(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{} = {}", hcl_quote(k), v.to_hcl()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Render for the right-hand side of `-var name=value`. Top-level strings
    /// are passed raw; Terraform treats an unquoted value as a string.
    pub fn to_var_arg_value(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            other => other.to_hcl(),
        }
    }
}

fn hcl_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl<T: Into<VarValue>> From<Vec<T>> for VarValue {
    fn from(items: Vec<T>) -> Self {
        VarValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Terraform input variables. Ordering carries no meaning; a `BTreeMap` keeps
/// the rendered command line stable.
pub type VarSet = BTreeMap<String, VarValue>;

/// Extra environment layered onto the Terraform subprocess.
pub type EnvOverrides = BTreeMap<String, String>;

/// Render a [`VarSet`] as a flat list of `-var` arguments.
pub fn var_args(vars: &VarSet) -> Vec<String> {
    let mut args = Vec::with_capacity(vars.len() * 2);
    for (name, value) in vars {
        args.push("-var".to_string());
        args.push(format!("{}={}", name, value.to_var_arg_value()));
    }
    args
}

/// Merge caller-supplied extras under the variables the harness owns.
/// Extras may not shadow `test_name` or `vpc_azs`.
pub fn merge_vars(base: VarSet, extras: &VarSet) -> Result<VarSet, DomainError> {
    let mut merged = base;
    for (k, v) in extras {
        if k == VAR_TEST_NAME || k == VAR_VPC_AZS {
            return Err(DomainError::ReservedVariable(k.clone()));
        }
        merged.insert(k.clone(), v.clone());
    }
    Ok(merged)
}

// ── Observed resources ────────────────────────────────────────────────────────

/// An ECS cluster as reported by `DescribeClusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsCluster {
    pub cluster_name: String,
    pub cluster_arn: String,
    pub status: String,
    pub registered_container_instances: u64,
    pub running_tasks: u64,
    pub pending_tasks: u64,
    pub active_services: u64,
}
