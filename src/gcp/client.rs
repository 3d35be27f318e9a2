//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication,
//! HTTP transport and the base URL of every API the inventory reads.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;

/// Base URL of each REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compute: String,
    pub storage: String,
    pub container: String,
    pub redis: String,
    pub iam: String,
    pub resource_manager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            storage: "https://storage.googleapis.com/storage/v1".to_string(),
            container: "https://container.googleapis.com/v1".to_string(),
            redis: "https://redis.googleapis.com/v1".to_string(),
            iam: "https://iam.googleapis.com/v1".to_string(),
            resource_manager: "https://cloudresourcemanager.googleapis.com/v1".to_string(),
        }
    }
}

impl Endpoints {
    /// Every API served below one base URL, as a local mock server does
    pub fn uniform(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compute: format!("{}/compute/v1", base),
            storage: format!("{}/storage/v1", base),
            container: format!("{}/container/v1", base),
            redis: format!("{}/redis/v1", base),
            iam: format!("{}/iam/v1", base),
            resource_manager: format!("{}/resourcemanager/v1", base),
        }
    }
}

/// Main GCP client
#[derive(Debug, Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
    pub project_id: String,
}

impl GcpClient {
    /// Create a client using Application Default Credentials
    pub async fn new(project_id: &str, max_requests_in_flight: usize) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(project_id, credentials, max_requests_in_flight)
    }

    /// Create a client with explicit credentials and default endpoints
    pub fn with_credentials(
        project_id: &str,
        credentials: GcpCredentials,
        max_requests_in_flight: usize,
    ) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::with_max_in_flight(max_requests_in_flight)?,
            endpoints: Endpoints::default(),
            project_id: project_id.to_string(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.post(url, &token, body).await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.endpoints.compute, self.project_id, path
        )
    }

    /// Build zonal Compute Engine API URL
    pub fn compute_zonal_url(&self, zone: &str, resource: &str) -> String {
        self.compute_url(&format!("zones/{}/{}", zone, resource))
    }

    /// Build regional Compute Engine API URL
    pub fn compute_regional_url(&self, region: &str, resource: &str) -> String {
        self.compute_url(&format!("regions/{}/{}", region, resource))
    }

    // =========================================================================
    // Cloud Storage API helpers
    // =========================================================================

    /// Build Cloud Storage API URL
    pub fn storage_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.storage, path)
    }

    // =========================================================================
    // GKE API helpers
    // =========================================================================

    /// Build GKE location URL (region or zone)
    pub fn container_location_url(&self, location: &str, resource: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/{}",
            self.endpoints.container, self.project_id, location, resource
        )
    }

    // =========================================================================
    // Memorystore Redis API helpers
    // =========================================================================

    pub fn redis_location_url(&self, location: &str, resource: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/{}",
            self.endpoints.redis, self.project_id, location, resource
        )
    }

    // =========================================================================
    // IAM API helpers
    // =========================================================================

    /// Build IAM API URL for a project-scoped collection
    pub fn iam_project_url(&self, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.iam, self.project_id, path)
    }

    // =========================================================================
    // Resource Manager API helpers
    // =========================================================================

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.resource_manager, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        GcpClient::with_credentials("my-project", GcpCredentials::from_token("t"), 0)
            .unwrap()
            .with_endpoints(Endpoints::uniform("http://127.0.0.1:9000/"))
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.compute, "https://compute.googleapis.com/compute/v1");
        assert_eq!(endpoints.container, "https://container.googleapis.com/v1");
    }

    #[test]
    fn test_url_builders() {
        let client = client();
        assert_eq!(
            client.compute_zonal_url("us-east1-b", "disks"),
            "http://127.0.0.1:9000/compute/v1/projects/my-project/zones/us-east1-b/disks"
        );
        assert_eq!(
            client.compute_regional_url("us-east1", "subnetworks"),
            "http://127.0.0.1:9000/compute/v1/projects/my-project/regions/us-east1/subnetworks"
        );
        assert_eq!(
            client.container_location_url("us-east1", "clusters"),
            "http://127.0.0.1:9000/container/v1/projects/my-project/locations/us-east1/clusters"
        );
        assert_eq!(
            client.iam_project_url("roles"),
            "http://127.0.0.1:9000/iam/v1/projects/my-project/roles"
        );
        assert_eq!(
            client.resourcemanager_url("organizations:search"),
            "http://127.0.0.1:9000/resourcemanager/v1/organizations:search"
        );
    }
}
