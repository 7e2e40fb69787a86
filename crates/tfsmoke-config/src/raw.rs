use serde::{Deserialize, Serialize};
use tfsmoke_domain::VarSet;

/// Raw YAML representation of `tfsmoke.yml`. Every field is optional; the
/// loader fills in defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawSmokeConfig {
    pub module_root: Option<String>,
    pub module_dir: Option<String>,
    pub binary: Option<String>,
    pub name_prefix: Option<String>,
    pub cluster_suffix: Option<String>,
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub forbidden_regions: Vec<String>,
    pub zone_count: Option<usize>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub vars: VarSet,
}
