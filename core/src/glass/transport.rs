/// Device transport: how status, commands and frames reach the glass
///
/// Local targets are spoken to directly with a dedicated HTTP client that
/// never carries the backend's Authorization / X-User-ID headers. Cloud
/// targets go through the backend relay via [`MedLensApi`].
use super::state::battery_percent;
use super::target::{ConnectionMode, ConnectionTarget};
use crate::api::types::{GlassCommand, RelayStatus};
use crate::api::{ApiError, ApiErrorKind, MedLensApi};
use crate::config::GlassConfig;
use crate::{MedLensError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone)]
pub enum GlassError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("device returned status {0}")]
    Status(u16),

    #[error("unexpected device response: {0}")]
    Decode(String),

    #[error("relay error: {0}")]
    Api(ApiError),
}

impl GlassError {
    pub fn is_timeout(&self) -> bool {
        match self {
            GlassError::Timeout => true,
            GlassError::Api(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Request never produced an HTTP response (what a browser reports as a network error)
    pub fn is_network(&self) -> bool {
        match self {
            GlassError::Network(_) => true,
            GlassError::Api(e) => e.is_network(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GlassError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GlassError::Timeout
        } else if let Some(status) = e.status() {
            GlassError::Status(status.as_u16())
        } else if e.is_decode() {
            GlassError::Decode(e.to_string())
        } else {
            GlassError::Network(e.to_string())
        }
    }
}

impl From<ApiError> for GlassError {
    fn from(e: ApiError) -> Self {
        match e.kind {
            ApiErrorKind::Timeout => GlassError::Timeout,
            _ => GlassError::Api(e),
        }
    }
}

/// Normalized answer to a status check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Local: body `status == "ok"`; cloud: relay `connected == true`
    pub online: bool,
    pub battery_level: Option<u8>,
    /// Account the relay has the device paired to
    pub owner_id: Option<String>,
}

impl From<RelayStatus> for DeviceStatus {
    fn from(status: RelayStatus) -> Self {
        Self {
            online: status.connected,
            battery_level: battery_percent(status.battery),
            owner_id: status.user_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Local `GET /status` body
#[derive(Debug, Deserialize)]
struct LocalStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    battery: Option<f64>,
}

#[derive(Debug, Serialize)]
struct LocalDisplay<'a> {
    line1: &'a str,
    line2: &'a str,
    alert: bool,
    info: &'a str,
}

/// Seam between the connectivity logic and the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GlassTransport: Send + Sync {
    async fn fetch_status(&self, target: &ConnectionTarget) -> std::result::Result<DeviceStatus, GlassError>;

    async fn send_command(
        &self,
        target: &ConnectionTarget,
        command: &GlassCommand,
    ) -> std::result::Result<(), GlassError>;

    /// One JPEG frame from the device
    async fn capture_frame(&self, target: &ConnectionTarget) -> std::result::Result<Vec<u8>, GlassError>;

    async fn pair(&self, device_id: &str) -> std::result::Result<(), GlassError>;

    async fn unpair(&self, device_id: &str) -> std::result::Result<(), GlassError>;

    /// Live view URL (opened by the viewer, never fetched here)
    fn stream_url(&self, target: &ConnectionTarget) -> String;

    fn snapshot_url(&self, target: &ConnectionTarget) -> String;
}

/// HTTP transport used in production
pub struct HttpGlassTransport {
    config: GlassConfig,
    device_client: reqwest::Client,
    api: Arc<MedLensApi>,
}

impl HttpGlassTransport {
    pub fn new(config: GlassConfig, api: Arc<MedLensApi>) -> Result<Self> {
        // Fresh client: no default headers, so no bearer token leaks to LAN devices
        let device_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| MedLensError::ConfigError(format!("Failed to build device client: {}", e)))?;

        Ok(Self {
            config,
            device_client,
            api,
        })
    }

    async fn local_get(
        &self,
        target: &ConnectionTarget,
        endpoint: &str,
        timeout: std::time::Duration,
    ) -> std::result::Result<reqwest::Response, GlassError> {
        let url = target.device_url(endpoint);
        debug!(target: "glass_transport", url = %url, "GET device");
        let response = self
            .device_client
            .get(&url)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GlassError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl GlassTransport for HttpGlassTransport {
    async fn fetch_status(&self, target: &ConnectionTarget) -> std::result::Result<DeviceStatus, GlassError> {
        match target.mode() {
            ConnectionMode::Cloud => Ok(self.api.glass_status(target.as_str()).await?.into()),
            ConnectionMode::Local => {
                let response = self
                    .local_get(target, "status", self.config.status_timeout())
                    .await?;
                let body: LocalStatus = response
                    .json()
                    .await
                    .map_err(|e| GlassError::Decode(e.to_string()))?;
                Ok(DeviceStatus {
                    online: body.status == "ok",
                    battery_level: battery_percent(body.battery),
                    owner_id: None,
                })
            }
        }
    }

    async fn send_command(
        &self,
        target: &ConnectionTarget,
        command: &GlassCommand,
    ) -> std::result::Result<(), GlassError> {
        if target.is_cloud() {
            return Ok(self.api.glass_command(target.as_str(), command).await?);
        }

        match command {
            GlassCommand::DisplayText {
                line1,
                line2,
                alert,
                info,
            } => {
                let url = target.device_url("display");
                let response = self
                    .device_client
                    .post(&url)
                    .json(&LocalDisplay {
                        line1,
                        line2,
                        alert: *alert,
                        info,
                    })
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(GlassError::Status(response.status().as_u16()));
                }
                Ok(())
            }
            GlassCommand::ResetWifi => {
                self.local_get(target, "reset_wifi", self.config.reset_timeout())
                    .await?;
                Ok(())
            }
        }
    }

    async fn capture_frame(&self, target: &ConnectionTarget) -> std::result::Result<Vec<u8>, GlassError> {
        let timeout = self.config.capture_timeout();
        if target.is_cloud() {
            return Ok(self.api.glass_frame(target.as_str(), timeout).await?);
        }
        let response = self.local_get(target, "capture", timeout).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn pair(&self, device_id: &str) -> std::result::Result<(), GlassError> {
        Ok(self.api.pair_device(device_id).await?)
    }

    async fn unpair(&self, device_id: &str) -> std::result::Result<(), GlassError> {
        Ok(self.api.unpair_device(device_id).await?)
    }

    fn stream_url(&self, target: &ConnectionTarget) -> String {
        if target.is_cloud() {
            self.api.glass_frame_url(target.as_str())
        } else {
            target.device_url("stream")
        }
    }

    fn snapshot_url(&self, target: &ConnectionTarget) -> String {
        if target.is_cloud() {
            self.api.glass_frame_url(target.as_str())
        } else {
            target.device_url("capture")
        }
    }
}
