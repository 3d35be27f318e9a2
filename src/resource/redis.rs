//! Memorystore for Redis instances
//!
//! The Redis API is optional; when it is disabled the region has no
//! instances.

use anyhow::Result;
use serde_json::Value;

use super::fetcher::list_all_if_enabled;
use crate::context::FetchContext;

pub async fn list_instances(ctx: &FetchContext, region: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing Redis instances in {}", region);
    let url = ctx.client.redis_location_url(region, "instances");
    let instances =
        list_all_if_enabled(ctx, &format!("Redis instances in {}", region), &url, "instances").await?;
    tracing::info!("Found {} Redis instances in {}", instances.len(), region);
    Ok(instances)
}
