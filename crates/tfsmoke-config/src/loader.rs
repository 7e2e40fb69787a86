use std::path::{Path, PathBuf};
use std::time::Duration;

use tfsmoke_domain::{ClusterNaming, VAR_TEST_NAME, VAR_VPC_AZS};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawSmokeConfig;
use crate::settings::{SmokeConfig, DEFAULT_MODULE_ROOT};

pub const CONFIG_FILE_NAME: &str = "tfsmoke.yml";

/// Load and validate a config file.
///
/// A relative `module_root` is resolved against the directory holding the
/// file, so the same config works from any working directory.
pub fn load_config(path: &Path) -> Result<SmokeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawSmokeConfig = if content.trim().is_empty() {
        RawSmokeConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        })?
    };
    debug!("Loaded smoke config from {}", path.display());

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    convert(raw, base, path)
}

/// Look for `tfsmoke.yml` in `dir`; fall back to defaults relative to `dir`.
pub fn load_config_or_default(dir: &Path) -> Result<SmokeConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return load_config(&path);
    }
    debug!("No {} in {}; using defaults", CONFIG_FILE_NAME, dir.display());
    Ok(SmokeConfig {
        module_root: dir.join(DEFAULT_MODULE_ROOT),
        ..SmokeConfig::default()
    })
}

fn convert(raw: RawSmokeConfig, base: &Path, path: &Path) -> Result<SmokeConfig, ConfigError> {
    let defaults = SmokeConfig::default();
    let conversion = |message: String| ConfigError::Conversion {
        path: path.display().to_string(),
        message,
    };

    let module_root = match raw.module_root {
        Some(root) => {
            let root = PathBuf::from(root);
            if root.is_absolute() { root } else { base.join(root) }
        }
        None => base.join(DEFAULT_MODULE_ROOT),
    };

    let module_dir = raw.module_dir.map(PathBuf::from).unwrap_or(defaults.module_dir);
    if module_dir.is_absolute() {
        return Err(conversion(format!(
            "module_dir must be relative to module_root, got '{}'",
            module_dir.display()
        )));
    }

    let binary = raw.binary.unwrap_or(defaults.binary);
    if binary.trim().is_empty() {
        return Err(conversion("binary must not be blank".into()));
    }

    let naming = ClusterNaming::new(
        raw.name_prefix.unwrap_or(defaults.naming.prefix),
        raw.cluster_suffix.unwrap_or(defaults.naming.cluster_suffix),
    )?;

    let regions = raw.regions.unwrap_or(defaults.regions);
    if regions.is_empty() {
        return Err(conversion("regions must list at least one candidate".into()));
    }

    let zone_count = raw.zone_count.unwrap_or(defaults.zone_count);
    if zone_count == 0 {
        return Err(conversion("zone_count must be at least 1".into()));
    }

    for reserved in [VAR_TEST_NAME, VAR_VPC_AZS] {
        if raw.vars.contains_key(reserved) {
            return Err(conversion(format!(
                "vars may not set '{}'; the harness owns it",
                reserved
            )));
        }
    }

    Ok(SmokeConfig {
        module_root,
        module_dir,
        binary,
        naming,
        regions,
        forbidden_regions: raw.forbidden_regions,
        zone_count,
        timeout: raw.timeout_secs.map(Duration::from_secs),
        vars: raw.vars,
    })
}
