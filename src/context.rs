//! Per-run fetch context
//!
//! Everything a leaf fetch needs, passed explicitly: the configured client,
//! the loader's retry policy and the run's cancellation token.

use anyhow::Result;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::gcp::client::GcpClient;
use crate::loader::{Loader, LoaderOptions};

#[derive(Debug, Clone)]
pub struct FetchContext {
    pub client: GcpClient,
    pub loader: LoaderOptions,
    pub cancel: CancellationToken,
}

impl FetchContext {
    pub fn new(client: GcpClient, loader: LoaderOptions, cancel: CancellationToken) -> Self {
        Self {
            client,
            loader,
            cancel,
        }
    }

    pub fn project(&self) -> &str {
        &self.client.project_id
    }

    /// A loader bound to this run's retry policy and cancellation
    pub fn loader(&self) -> Loader {
        Loader::new(self.loader.clone(), self.cancel.clone())
    }

    /// GET that gives up as soon as the run is cancelled
    pub async fn get(&self, url: &str) -> Result<Value> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled.into()),
            result = self.client.get(url) => result,
        }
    }

    /// POST that gives up as soon as the run is cancelled
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled.into()),
            result = self.client.post(url, body) => result,
        }
    }
}
