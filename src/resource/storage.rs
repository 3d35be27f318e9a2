//! Cloud Storage buckets

use anyhow::Result;
use serde_json::Value;

use super::fetcher::list_all;
use crate::context::FetchContext;

pub async fn list_buckets(ctx: &FetchContext) -> Result<Vec<Value>> {
    tracing::debug!("Listing buckets of {}", ctx.project());
    let url = ctx
        .client
        .storage_url(&format!("b?project={}", urlencoding::encode(ctx.project())));
    let buckets = list_all(ctx, "buckets", &url, "items").await?;
    tracing::info!("Found {} buckets", buckets.len());
    Ok(buckets)
}
