//! Client configuration.
//!
//! Every default can be overridden by an environment variable so the
//! companion binary and tests share one source of truth.

use crate::glass::MatchPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Floor for the poll and scan periods; zero would busy-loop the device
pub const MIN_INTERVAL_MS: u64 = 100;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

/// Top-level configuration for one client instance
#[derive(Clone, Debug)]
pub struct MedLensConfig {
    pub api: ApiConfig,
    pub glass: GlassConfig,
    /// JSON file standing in for browser local storage; `None` keeps state in memory
    pub storage_path: Option<PathBuf>,
    /// Whether the client is considered served from a secure (https) origin.
    /// Insecure LAN devices cannot be reached from such an origin.
    pub secure_origin: bool,
}

impl Default for MedLensConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            glass: GlassConfig::default(),
            storage_path: env_string("MEDLENS_STORAGE").map(PathBuf::from),
            secure_origin: env_parse("MEDLENS_SECURE_ORIGIN").unwrap_or(false),
        }
    }
}

/// Backend REST API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend origin, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Default timeout applied to every backend call
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: env_string("MEDLENS_API_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            request_timeout_ms: env_parse("MEDLENS_REQUEST_TIMEOUT_MS").unwrap_or(60_000),
            user_agent: "medlens-client/0.1".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Smart glass connectivity and scanning settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlassConfig {
    /// Target used when nothing is persisted yet
    pub default_target: String,
    /// Status poll period while connected
    pub poll_interval_ms: u64,
    /// Capture/recognize period while scanning
    pub scan_interval_ms: u64,
    /// Local `/status` status check timeout
    pub status_timeout_ms: u64,
    /// Frame capture timeout (both modes)
    pub capture_timeout_ms: u64,
    /// Local `/reset_wifi` timeout; the device reboots so a timeout is expected
    pub reset_timeout_ms: u64,
    /// Consecutive failed status checks before the link is declared down
    pub failure_threshold: u32,
    /// How long a successful local status check keeps the "recently connected" hint alive
    pub recent_ok_window_ms: i64,
    /// What the scan loop does after a positive match
    pub match_policy: MatchPolicy,
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            default_target: env_string("GLASS_TARGET")
                .unwrap_or_else(|| "localhost:8001".to_string()),
            poll_interval_ms: env_parse("GLASS_POLL_MS")
                .unwrap_or(10_000)
                .max(MIN_INTERVAL_MS),
            scan_interval_ms: env_parse("GLASS_SCAN_MS")
                .unwrap_or(3_000)
                .max(MIN_INTERVAL_MS),
            status_timeout_ms: 8_000,
            capture_timeout_ms: 8_000,
            reset_timeout_ms: 2_000,
            failure_threshold: 3,
            recent_ok_window_ms: 45_000,
            match_policy: env_string("GLASS_MATCH_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }
}

impl GlassConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}
