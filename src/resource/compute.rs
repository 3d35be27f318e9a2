//! Compute Engine: zones, instances and disks

use anyhow::Result;
use serde_json::Value;

use super::fetcher::{extract_short_name, get_one, list_all};
use crate::context::FetchContext;

/// Zone names of a region, from the region's own description
pub async fn list_zones(ctx: &FetchContext, region: &str) -> Result<Vec<String>> {
    tracing::debug!("Listing zones of {}", region);

    let url = ctx.client.compute_url(&format!("regions/{}", region));
    let detail = get_one(ctx, &format!("region {}", region), &url).await?;

    let zones: Vec<String> = detail
        .get("zones")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|z| z.as_str())
                .map(extract_short_name)
                .collect()
        })
        .unwrap_or_default();

    tracing::info!("Found {} zones in {}", zones.len(), region);
    Ok(zones)
}

pub async fn list_instances(ctx: &FetchContext, zone: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing instances in {}", zone);
    let url = ctx.client.compute_zonal_url(zone, "instances");
    let instances = list_all(ctx, &format!("instances in {}", zone), &url, "items").await?;
    tracing::info!("Found {} instances in {}", instances.len(), zone);
    Ok(instances)
}

pub async fn list_disks(ctx: &FetchContext, zone: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing disks in {}", zone);
    let url = ctx.client.compute_zonal_url(zone, "disks");
    let disks = list_all(ctx, &format!("disks in {}", zone), &url, "items").await?;
    tracing::info!("Found {} disks in {}", disks.len(), zone);
    Ok(disks)
}
