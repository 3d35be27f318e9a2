//! VPC networking

use anyhow::Result;
use serde_json::Value;

use super::fetcher::list_all;
use crate::context::FetchContext;

pub async fn list_subnetworks(ctx: &FetchContext, region: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing subnetworks in {}", region);
    let url = ctx.client.compute_regional_url(region, "subnetworks");
    let subnetworks = list_all(ctx, &format!("subnetworks in {}", region), &url, "items").await?;
    tracing::info!("Found {} subnetworks in {}", subnetworks.len(), region);
    Ok(subnetworks)
}
