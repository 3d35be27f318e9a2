//! Google Kubernetes Engine clusters and their node pools
//!
//! Regional clusters live under the region itself. The Kubernetes Engine API
//! is optional; when it is disabled the region simply has no clusters.

use anyhow::Result;
use serde_json::Value;

use super::fetcher::{list_all_if_enabled, str_field};
use crate::context::FetchContext;

pub async fn list_clusters(ctx: &FetchContext, region: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing GKE clusters in {}", region);
    let url = ctx.client.container_location_url(region, "clusters");
    let clusters =
        list_all_if_enabled(ctx, &format!("GKE clusters in {}", region), &url, "clusters").await?;
    tracing::info!("Found {} GKE clusters in {}", clusters.len(), region);
    Ok(clusters)
}

/// Node pools of one cluster. Each pool is tagged with its cluster's name so
/// pools of different clusters stay distinguishable in the shared field.
pub async fn list_node_pools(ctx: &FetchContext, region: &str, cluster: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing node pools of cluster {} in {}", cluster, region);
    let url = ctx
        .client
        .container_location_url(region, &format!("clusters/{}/nodePools", cluster));
    let mut pools = list_all_if_enabled(
        ctx,
        &format!("node pools of {} in {}", cluster, region),
        &url,
        "nodePools",
    )
    .await?;

    for pool in &mut pools {
        if let Value::Object(map) = pool {
            map.entry("clusterName")
                .or_insert_with(|| Value::String(cluster.to_string()));
        }
    }

    tracing::info!("Found {} node pools in cluster {}", pools.len(), cluster);
    Ok(pools)
}

/// Names of the clusters in a cluster listing
pub fn cluster_names(clusters: &[Value]) -> Vec<String> {
    clusters
        .iter()
        .filter_map(|c| str_field(c, "name"))
        .map(str::to_string)
        .collect()
}
