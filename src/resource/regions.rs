//! Region lister

use anyhow::Result;

use super::fetcher::{list_all, str_field};
use crate::context::FetchContext;

/// Names of every Compute Engine region visible to the project
pub async fn list_regions(ctx: &FetchContext) -> Result<Vec<String>> {
    tracing::debug!("Listing regions of {}", ctx.project());
    let url = ctx.client.compute_url("regions");
    let regions: Vec<String> = list_all(ctx, "regions", &url, "items")
        .await?
        .iter()
        .filter_map(|r| str_field(r, "name"))
        .map(str::to_string)
        .collect();
    tracing::info!("Found {} regions", regions.len());
    Ok(regions)
}
