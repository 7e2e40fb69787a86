use rand::seq::SliceRandom;
use tfsmoke_domain::STABLE_REGIONS;
use tracing::{debug, info};

use crate::driver::Inventory;
use crate::error::DriverError;

/// Candidate regions after the static filters: `approved` ∩ stable set,
/// minus `forbidden`. An empty `approved` list means "any stable region".
pub fn stable_candidates(approved: &[String], forbidden: &[String]) -> Vec<String> {
    let base: Vec<String> = if approved.is_empty() {
        STABLE_REGIONS.iter().map(|r| r.to_string()).collect()
    } else {
        approved
            .iter()
            .filter(|r| STABLE_REGIONS.contains(&r.as_str()))
            .cloned()
            .collect()
    };
    base.into_iter().filter(|r| !forbidden.contains(r)).collect()
}

/// Pick one region at random from the stable candidates that the account has
/// enabled. The `DescribeRegions` call doubles as a reachability check: a region
/// the account cannot reach is never picked.
pub async fn random_stable_region(
    inventory: &dyn Inventory,
    approved: &[String],
    forbidden: &[String],
) -> Result<String, DriverError> {
    let candidates = stable_candidates(approved, forbidden);
    if candidates.is_empty() {
        return Err(DriverError::NoRegionAvailable(format!(
            "no stable region left after filtering approved={:?} forbidden={:?}",
            approved, forbidden
        )));
    }

    let enabled = inventory.enabled_regions().await?;
    let usable: Vec<String> = candidates.into_iter().filter(|r| enabled.contains(r)).collect();
    debug!(?usable, "usable regions");

    let region = usable
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| {
            DriverError::NoRegionAvailable(format!(
                "none of the candidate regions are enabled for this account (approved={:?})",
                approved
            ))
        })?;
    info!(%region, "selected region");
    Ok(region)
}

/// The first `count` availability zones of `region`, in API order.
pub async fn first_availability_zones(
    inventory: &dyn Inventory,
    region: &str,
    count: usize,
) -> Result<Vec<String>, DriverError> {
    let mut zones = inventory.availability_zones(region).await?;
    if zones.len() < count {
        return Err(DriverError::InsufficientZones {
            region: region.to_string(),
            found: zones.len(),
            required: count,
        });
    }
    zones.truncate(count);
    Ok(zones)
}
