//! Resource Manager: organizations and projects visible to the caller

use anyhow::Result;
use serde_json::{json, Value};

use super::fetcher::{list_all, parse_page};
use crate::context::FetchContext;

/// Organizations the caller can see. `organizations:search` pages through
/// its request body rather than the query string.
pub async fn list_organizations(ctx: &FetchContext) -> Result<Vec<Value>> {
    tracing::debug!("Searching organizations");
    let url = ctx.client.resourcemanager_url("organizations:search");
    let url = url.as_str();

    let organizations = ctx
        .loader()
        .fetch_all("organizations", |token| async move {
            let body = match token {
                Some(token) => json!({ "pageToken": token }),
                None => json!({}),
            };
            ctx.post(url, Some(&body))
                .await
                .map(|response| parse_page(&response, "organizations"))
        })
        .await?;

    tracing::info!("Found {} organizations", organizations.len());
    Ok(organizations)
}

pub async fn list_projects(ctx: &FetchContext) -> Result<Vec<Value>> {
    tracing::debug!("Listing projects");
    let url = ctx.client.resourcemanager_url("projects");
    let projects = list_all(ctx, "projects", &url, "projects").await?;
    tracing::info!("Found {} projects", projects.len());
    Ok(projects)
}
