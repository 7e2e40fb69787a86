use std::path::PathBuf;
use std::time::Duration;

use tfsmoke_domain::{ClusterNaming, VarSet, DEFAULT_CANDIDATE_REGIONS};

/// Folder, relative to the config file, that holds the Terraform modules.
pub const DEFAULT_MODULE_ROOT: &str = "terraform";

/// Fully-resolved smoke test settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    /// Root folder copied to a temp location before each run.
    pub module_root: PathBuf,
    /// Module path relative to `module_root`; Terraform runs here.
    pub module_dir: PathBuf,
    /// `terraform` or `tofu`.
    pub binary: String,
    pub naming: ClusterNaming,
    pub regions: Vec<String>,
    pub forbidden_regions: Vec<String>,
    /// How many availability zones are handed to the module as `vpc_azs`.
    pub zone_count: usize,
    /// Optional wall-clock limit for each Terraform command.
    pub timeout: Option<Duration>,
    /// Extra variables merged under `test_name` / `vpc_azs`.
    pub vars: VarSet,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            module_root: PathBuf::from(DEFAULT_MODULE_ROOT),
            module_dir: PathBuf::from("simple"),
            binary: "terraform".into(),
            naming: ClusterNaming::default(),
            regions: DEFAULT_CANDIDATE_REGIONS.iter().map(|r| r.to_string()).collect(),
            forbidden_regions: Vec::new(),
            zone_count: 3,
            timeout: None,
            vars: VarSet::new(),
        }
    }
}
