//! Connectivity probe and remote sync target abstractions.
//!
//! Both collaborators are traits so the engine can be wired with test
//! doubles; the HTTP implementations are the production wiring.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{OfflineRecord, RecordType};

/// Reachability probe for the remote service.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the remote service is currently reachable.
    async fn is_online(&self) -> bool;
}

/// A record as known to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub record_type: RecordType,
    pub data: Value,
}

/// Remote counterpart accepting and returning JSON records.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Fetch the remote copy of an entity, if it exists.
    async fn fetch(&self, record_type: &RecordType, remote_id: &str) -> Result<Option<Value>>;

    /// Create a new remote entity; returns the server echo.
    async fn create(&self, record: &OfflineRecord) -> Result<Value>;

    /// Update an existing remote entity; returns the server echo.
    async fn update(&self, remote_id: &str, record: &OfflineRecord) -> Result<Value>;

    /// Records last synced for a worker (used by server-tier recovery).
    async fn records_for_worker(&self, worker_id: &str) -> Result<Vec<RemoteRecord>>;
}

/// HTTP probe against the remote service's status endpoint.
pub struct HttpConnectivityProbe {
    client: reqwest::Client,
    status_url: String,
}

impl HttpConnectivityProbe {
    pub fn new(status_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Remote(error.to_string()))?;
        Ok(Self {
            client,
            status_url: status_url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_online(&self) -> bool {
        match self.client.get(&self.status_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// JSON-over-HTTP sync target.
pub struct HttpSyncTarget {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSyncTarget {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidInput(
                "Sync base URL must include http:// or https://".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Remote(error.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn record_envelope(record: &OfflineRecord) -> Value {
        serde_json::json!({
            "record_id": record.id.as_str(),
            "record_type": record.record_type.as_str(),
            "worker_id": record.worker_id,
            "device_id": record.device_id,
            "timestamp": record.timestamp,
            "operation": record.operation.as_str(),
            "checksum": record.checksum,
            "data": record.data,
        })
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "HTTP {status}: {}",
                body.trim().chars().take(180).collect::<String>()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|error| Error::Remote(error.to_string()))
    }
}

#[async_trait]
impl SyncTarget for HttpSyncTarget {
    async fn fetch(&self, record_type: &RecordType, remote_id: &str) -> Result<Option<Value>> {
        let url = format!(
            "{}/records/{}/{remote_id}",
            self.base_url,
            record_type.as_str()
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| Error::Remote(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_response(response).await?))
    }

    async fn create(&self, record: &OfflineRecord) -> Result<Value> {
        let url = format!("{}/records/{}", self.base_url, record.record_type.as_str());
        let response = self
            .client
            .post(url)
            .json(&Self::record_envelope(record))
            .send()
            .await
            .map_err(|error| Error::Remote(error.to_string()))?;
        Self::parse_response(response).await
    }

    async fn update(&self, remote_id: &str, record: &OfflineRecord) -> Result<Value> {
        let url = format!(
            "{}/records/{}/{remote_id}",
            self.base_url,
            record.record_type.as_str()
        );
        let response = self
            .client
            .put(url)
            .json(&Self::record_envelope(record))
            .send()
            .await
            .map_err(|error| Error::Remote(error.to_string()))?;
        Self::parse_response(response).await
    }

    async fn records_for_worker(&self, worker_id: &str) -> Result<Vec<RemoteRecord>> {
        let url = format!("{}/workers/{worker_id}/records", self.base_url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| Error::Remote(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let payload = Self::parse_response(response).await?;
        serde_json::from_value(payload).map_err(|error| Error::Remote(error.to_string()))
    }
}
