use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tfsmoke_config::{load_config, load_config_or_default, SmokeConfig};
use tfsmoke_driver::{stable_candidates, AwsInventory, AwsInventoryConfig, Inventory, TerraformRunner};
use tfsmoke_harness::{run_smoke_test, SmokeError};
use tracing::info;

use crate::output;

// ── Run ───────────────────────────────────────────────────────────────────────

pub async fn run(config_path: Option<PathBuf>, regions: Vec<String>, json: bool) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if !regions.is_empty() {
        config.regions = regions;
    }
    info!(
        module = %config.module_root.join(&config.module_dir).display(),
        binary = %config.binary,
        "loaded smoke test config"
    );

    let runner = TerraformRunner::new(config.binary.clone()).with_timeout(config.timeout);
    let inventory = AwsInventory::new(AwsInventoryConfig::default()).await;

    match run_smoke_test(&config, Arc::new(runner), Arc::new(inventory)).await {
        Ok(report) => {
            println!("{}", output::render_report(&report, json)?);
            Ok(())
        }
        Err(SmokeError::Run(report)) => {
            println!("{}", output::render_report(&report, json)?);
            anyhow::bail!("smoke test {} failed: {}", report.test_name, report.summary())
        }
        Err(e) => Err(e).context("Smoke test setup failed"),
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<SmokeConfig> {
    match path {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Cannot read current directory")?;
            load_config_or_default(&cwd)
                .with_context(|| format!("Failed to load config from {}", cwd.display()))
        }
    }
}

// ── Inventory queries ─────────────────────────────────────────────────────────

pub async fn regions(regions: Vec<String>, json: bool) -> Result<()> {
    let candidates = stable_candidates(&regions, &[]);
    let inventory = AwsInventory::new(AwsInventoryConfig::default()).await;
    let enabled = inventory
        .enabled_regions()
        .await
        .context("DescribeRegions failed")?;
    let usable: Vec<String> = candidates.into_iter().filter(|r| enabled.contains(r)).collect();
    println!("{}", output::render_list("regions", &usable, json)?);
    Ok(())
}

pub async fn zones(region: String, json: bool) -> Result<()> {
    let inventory = AwsInventory::new(AwsInventoryConfig::default()).await;
    let zones = inventory
        .availability_zones(&region)
        .await
        .with_context(|| format!("DescribeAvailabilityZones failed in {region}"))?;
    println!("{}", output::render_list("availability_zones", &zones, json)?);
    Ok(())
}

pub async fn describe_cluster(region: String, name: String, json: bool) -> Result<()> {
    let inventory = AwsInventory::new(AwsInventoryConfig::default()).await;
    let cluster = inventory
        .describe_cluster(&region, &name)
        .await
        .with_context(|| format!("Cannot describe ECS cluster {name} in {region}"))?;
    println!("{}", output::render_cluster(&cluster, json)?);
    Ok(())
}
