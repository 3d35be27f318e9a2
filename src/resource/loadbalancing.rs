//! Regional load balancing: forwarding rules and target pools

use anyhow::Result;
use serde_json::Value;

use super::fetcher::list_all;
use crate::context::FetchContext;

pub async fn list_forwarding_rules(ctx: &FetchContext, region: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing forwarding rules in {}", region);
    let url = ctx.client.compute_regional_url(region, "forwardingRules");
    let rules = list_all(ctx, &format!("forwarding rules in {}", region), &url, "items").await?;
    tracing::info!("Found {} forwarding rules in {}", rules.len(), region);
    Ok(rules)
}

pub async fn list_target_pools(ctx: &FetchContext, region: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing target pools in {}", region);
    let url = ctx.client.compute_regional_url(region, "targetPools");
    let pools = list_all(ctx, &format!("target pools in {}", region), &url, "items").await?;
    tracing::info!("Found {} target pools in {}", pools.len(), region);
    Ok(pools)
}
