//! Leaf fetches
//!
//! One function per GCP listing the inventory reads. Each drives its listing
//! through the run's loader and returns the raw records; none of them knows
//! about the executor or the result tree.
//!
//! - [`fetcher`] - shared pagination plumbing
//! - [`regions`] - the region lister
//! - one module per service

pub mod compute;
pub mod fetcher;
pub mod gke;
pub mod iam;
pub mod loadbalancing;
pub mod network;
pub mod redis;
pub mod regions;
pub mod resourcemanager;
pub mod storage;
