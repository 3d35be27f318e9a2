//! Resource Fetcher
//!
//! Shared plumbing for leaf fetches: one page of a GCP list call, and the
//! whole listing driven through the run's [`Loader`](crate::loader::Loader).

use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

use crate::context::FetchContext;
use crate::gcp::http::api_error;
use crate::loader::Page;

/// Add `pageToken` to a list URL
pub fn with_page_token(url: &str, page_token: Option<&str>) -> Result<String> {
    let Some(token) = page_token else {
        return Ok(url.to_string());
    };

    let mut parsed = Url::parse(url).with_context(|| format!("Invalid list URL: {}", url))?;
    parsed.query_pairs_mut().append_pair("pageToken", token);
    Ok(parsed.into())
}

/// Turn one list response into a page
pub fn parse_page(response: &Value, items_path: &str) -> Page<Value> {
    let next = response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Page::new(extract_items(response, items_path), next)
}

/// Fetch one page of a GET list call
pub async fn list_page(
    ctx: &FetchContext,
    url: &str,
    items_path: &str,
    page_token: Option<&str>,
) -> Result<Page<Value>> {
    let response = ctx.get(&with_page_token(url, page_token)?).await?;
    Ok(parse_page(&response, items_path))
}

/// Fetch every page of a GET list call
pub async fn list_all(
    ctx: &FetchContext,
    label: &str,
    url: &str,
    items_path: &str,
) -> Result<Vec<Value>> {
    ctx.loader()
        .fetch_all(label, |token| async move {
            list_page(ctx, url, items_path, token.as_deref()).await
        })
        .await
}

/// Like [`list_all`], for APIs that may not be enabled in the project. A
/// disabled API means there is nothing to list, which is an empty result
/// rather than a failure, and is never retried.
pub async fn list_all_if_enabled(
    ctx: &FetchContext,
    label: &str,
    url: &str,
    items_path: &str,
) -> Result<Vec<Value>> {
    ctx.loader()
        .fetch_all(label, |token| async move {
            match list_page(ctx, url, items_path, token.as_deref()).await {
                Err(err) if api_error(&err).is_some_and(|e| e.is_service_disabled()) => {
                    tracing::debug!("{} not available in {}: {:#}", label, ctx.project(), err);
                    Ok(Page::empty())
                }
                other => other,
            }
        })
        .await
}

/// GET a single (non-list) resource, retried like a one-page listing
pub async fn get_one(ctx: &FetchContext, label: &str, url: &str) -> Result<Value> {
    let mut values = ctx
        .loader()
        .fetch_all(label, |_| async move {
            ctx.get(url).await.map(|value| Page::new(vec![value], None))
        })
        .await?;
    Ok(values.pop().unwrap_or(Value::Null))
}

/// POST answering with a single resource, such as `getIamPolicy`
pub async fn post_one(
    ctx: &FetchContext,
    label: &str,
    url: &str,
    body: Option<&Value>,
) -> Result<Value> {
    let mut values = ctx
        .loader()
        .fetch_all(label, |_| async move {
            ctx.post(url, body)
                .await
                .map(|value| Page::new(vec![value], None))
        })
        .await?;
    Ok(values.pop().unwrap_or(Value::Null))
}

/// Extract items from response using a dot-separated path
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current = response;
    for part in path.split('.') {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// String field of a record, or `None` when missing
pub fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(|v| v.as_str())
}
