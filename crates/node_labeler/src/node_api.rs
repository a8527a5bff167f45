//! Cluster API access for the node object.
//!
//! [`NodeApi`] is the seam the sync loop talks through. [`KubeNodeApi`] is
//! the production implementation: plain HTTP against the Kubernetes API
//! server using the pod's service-account credentials, no client SDK.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::defaults::{API_REQUEST_TIMEOUT_SECS, IN_CLUSTER_CA_FILE, IN_CLUSTER_TOKEN_FILE};

/// Labels currently on a node.
pub type NodeLabels = BTreeMap<String, String>;

const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

#[derive(Error, Debug)]
pub enum NodeApiError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid API configuration: {0}")]
    Config(String),
}

/// Merge patch restricted to `metadata.labels`. `None` values clear labels;
/// labels not in the patch are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPatch {
    metadata: PatchMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PatchMetadata {
    labels: BTreeMap<String, Option<String>>,
}

impl LabelPatch {
    pub fn new(labels: BTreeMap<String, Option<String>>) -> Self {
        Self {
            metadata: PatchMetadata { labels },
        }
    }

    pub fn labels(&self) -> &BTreeMap<String, Option<String>> {
        &self.metadata.labels
    }
}

/// Read and patch access to node objects.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn read_labels(&self, node: &str) -> Result<NodeLabels, NodeApiError>;

    async fn patch_labels(&self, node: &str, patch: &LabelPatch) -> Result<(), NodeApiError>;
}

#[async_trait]
impl<T: NodeApi + ?Sized> NodeApi for Arc<T> {
    async fn read_labels(&self, node: &str) -> Result<NodeLabels, NodeApiError> {
        (**self).read_labels(node).await
    }

    async fn patch_labels(&self, node: &str, patch: &LabelPatch) -> Result<(), NodeApiError> {
        (**self).patch_labels(node, patch).await
    }
}

/// Where and how to reach the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfig {
    pub server: String,
    pub token_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

impl KubeConfig {
    /// Fill anything not given explicitly from the in-cluster environment.
    pub fn resolve(
        server: Option<String>,
        token_file: Option<PathBuf>,
        ca_file: Option<PathBuf>,
    ) -> Result<Self, NodeApiError> {
        let server = match server {
            Some(server) => server,
            None => in_cluster_server(
                std::env::var("KUBERNETES_SERVICE_HOST").ok(),
                std::env::var("KUBERNETES_SERVICE_PORT").ok(),
            )?,
        };
        let token_file = token_file.or_else(|| existing(IN_CLUSTER_TOKEN_FILE));
        let ca_file = ca_file.or_else(|| existing(IN_CLUSTER_CA_FILE));

        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            token_file,
            ca_file,
        })
    }

    pub fn node_url(&self, node: &str) -> String {
        format!("{}/api/v1/nodes/{}", self.server, node)
    }
}

fn existing(path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(path);
    path.exists().then_some(path)
}

fn in_cluster_server(host: Option<String>, port: Option<String>) -> Result<String, NodeApiError> {
    let host = host.filter(|h| !h.is_empty()).ok_or_else(|| {
        NodeApiError::Config(
            "KUBERNETES_SERVICE_HOST is not set; pass --api-server outside a cluster".to_string(),
        )
    })?;
    let port = port.filter(|p| !p.is_empty()).unwrap_or_else(|| "443".to_string());
    if host.contains(':') {
        Ok(format!("https://[{host}]:{port}"))
    } else {
        Ok(format!("https://{host}:{port}"))
    }
}

#[derive(Debug, Deserialize)]
struct NodeObject {
    #[serde(default)]
    metadata: NodeMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct NodeMetadata {
    #[serde(default)]
    labels: Option<NodeLabels>,
}

/// [`NodeApi`] over the Kubernetes REST API.
pub struct KubeNodeApi {
    config: KubeConfig,
    http_client: reqwest::Client,
}

impl KubeNodeApi {
    pub fn new(config: KubeConfig) -> Result<Self, NodeApiError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(API_REQUEST_TIMEOUT_SECS));

        if let Some(ca_file) = &config.ca_file {
            let pem = read_credential(ca_file)?;
            let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|err| {
                NodeApiError::Config(format!("Invalid CA bundle {}: {}", ca_file.display(), err))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http_client = builder
            .build()
            .map_err(|err| NodeApiError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Service-account tokens rotate, so the file is read on every request.
    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, NodeApiError> {
        match &self.config.token_file {
            Some(path) => {
                let token = read_credential(path)?;
                Ok(request.bearer_auth(token.trim()))
            }
            None => Ok(request),
        }
    }
}

fn read_credential(path: &Path) -> Result<String, NodeApiError> {
    std::fs::read_to_string(path).map_err(|source| NodeApiError::Credentials {
        path: path.to_path_buf(),
        source,
    })
}

async fn check_status(
    method: &'static str,
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, NodeApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NodeApiError::Status {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl NodeApi for KubeNodeApi {
    async fn read_labels(&self, node: &str) -> Result<NodeLabels, NodeApiError> {
        let url = self.config.node_url(node);
        tracing::debug!("GET {}", url);

        let request = self.authorize(self.http_client.get(&url))?;
        let response = request.send().await.map_err(|source| NodeApiError::Http {
            url: url.clone(),
            source,
        })?;
        let response = check_status("GET", &url, response).await?;

        let node: NodeObject = response.json().await.map_err(|source| NodeApiError::Http {
            url: url.clone(),
            source,
        })?;
        Ok(node.metadata.labels.unwrap_or_default())
    }

    async fn patch_labels(&self, node: &str, patch: &LabelPatch) -> Result<(), NodeApiError> {
        let url = self.config.node_url(node);
        tracing::debug!("PATCH {}", url);

        let body = serde_json::to_vec(patch)
            .map_err(|err| NodeApiError::Config(format!("Failed to encode patch: {err}")))?;
        let request = self.authorize(
            self.http_client
                .patch(&url)
                .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
                .body(body),
        )?;
        let response = request.send().await.map_err(|source| NodeApiError::Http {
            url: url.clone(),
            source,
        })?;
        check_status("PATCH", &url, response).await?;
        Ok(())
    }
}
