//! IAM: service accounts, their keys and policies, and custom roles

use anyhow::Result;
use serde_json::Value;

use super::fetcher::{list_all, post_one, str_field};
use crate::context::FetchContext;

pub async fn list_service_accounts(ctx: &FetchContext) -> Result<Vec<Value>> {
    tracing::debug!("Listing service accounts of {}", ctx.project());
    let url = ctx.client.iam_project_url("serviceAccounts");
    let accounts = list_all(ctx, "service accounts", &url, "accounts").await?;
    tracing::info!("Found {} service accounts", accounts.len());
    Ok(accounts)
}

/// Custom roles defined in the project
pub async fn list_roles(ctx: &FetchContext) -> Result<Vec<Value>> {
    tracing::debug!("Listing custom roles of {}", ctx.project());
    let url = ctx.client.iam_project_url("roles");
    let roles = list_all(ctx, "roles", &url, "roles").await?;
    tracing::info!("Found {} custom roles", roles.len());
    Ok(roles)
}

fn service_account_url(ctx: &FetchContext, email: &str, suffix: &str) -> String {
    ctx.client.iam_project_url(&format!(
        "serviceAccounts/{}{}",
        urlencoding::encode(email),
        suffix
    ))
}

pub async fn list_keys(ctx: &FetchContext, email: &str) -> Result<Vec<Value>> {
    tracing::debug!("Listing keys of {}", email);
    let url = service_account_url(ctx, email, "/keys");
    let keys = list_all(ctx, &format!("keys of {}", email), &url, "keys").await?;
    tracing::info!("Found {} keys for {}", keys.len(), email);
    Ok(keys)
}

/// The IAM policy attached to a service account
pub async fn get_policy(ctx: &FetchContext, email: &str) -> Result<Value> {
    tracing::debug!("Fetching IAM policy of {}", email);
    let url = service_account_url(ctx, email, ":getIamPolicy");
    post_one(ctx, &format!("IAM policy of {}", email), &url, None).await
}

/// Emails of the accounts in a service account listing
pub fn account_emails(accounts: &[Value]) -> Vec<String> {
    accounts
        .iter()
        .filter_map(|a| str_field(a, "email"))
        .map(str::to_string)
        .collect()
}
