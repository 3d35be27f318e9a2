//! gcp-inventory
//!
//! Enumerates the resources of a GCP project across every region and
//! aggregates them into one in-memory tree.
//!
//! # Module Structure
//!
//! - [`executor`] - bounded task executor with completion signals
//! - [`loader`] - paginated listing with retry and backoff
//! - [`orchestrator`] - region/service fan-out, dependencies and the drain loop
//! - [`error`] - batch, cancellation and aggregate errors
//! - [`inventory`] - the result tree
//! - [`filter`] - region and service selection
//! - [`context`] - per-run client, retry policy and cancellation
//! - [`gcp`] - authentication, HTTP transport and API endpoints
//! - [`resource`] - leaf fetches, one per GCP listing
//! - [`config`] - config file and settings resolution
//! - [`query`] - picking instances out of a finished tree
//!
//! # Example
//!
//! ```ignore
//! use gcp_inventory::context::FetchContext;
//! use gcp_inventory::filter::{RegionFilter, ServiceFilter};
//! use gcp_inventory::gcp::client::GcpClient;
//! use gcp_inventory::loader::LoaderOptions;
//! use gcp_inventory::orchestrator::run_aggregation;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new("my-project", 50).await?;
//!     let ctx = FetchContext::new(client, LoaderOptions::default(), CancellationToken::new());
//!     let inventory = run_aggregation(ctx, &RegionFilter::all(), &ServiceFilter::all()).await?;
//!     println!("{}", serde_json::to_string_pretty(&inventory)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod filter;
pub mod gcp;
pub mod inventory;
pub mod loader;
pub mod orchestrator;
pub mod query;
pub mod resource;

/// Version injected at compile time via GCPINV_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GCPINV_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
