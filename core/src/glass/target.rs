use serde::{Deserialize, Serialize};
use std::fmt;

/// How the client reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Browser-side HTTP straight to the device on the LAN
    Local,
    /// Backend relay addressed by an opaque device id
    Cloud,
}

/// Either `host:port` (optionally with a scheme) or a cloud device id.
///
/// The mode is derived from the string every time it is asked for; nothing
/// caches it, so changing the target can never leave a stale mode behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionTarget(String);

impl ConnectionTarget {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cloud iff non-empty, no `.` and no `localhost`
    pub fn mode(&self) -> ConnectionMode {
        if !self.0.is_empty() && !self.0.contains('.') && !self.0.contains("localhost") {
            ConnectionMode::Cloud
        } else {
            ConnectionMode::Local
        }
    }

    pub fn is_cloud(&self) -> bool {
        self.mode() == ConnectionMode::Cloud
    }

    /// Direct device URL for `endpoint`; `http://` is assumed when no scheme is given
    pub fn device_url(&self, endpoint: &str) -> String {
        let base = self.0.trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        if base.starts_with("http") {
            format!("{}/{}", base, endpoint)
        } else {
            format!("http://{}/{}", base, endpoint)
        }
    }

    pub fn is_loopback(&self) -> bool {
        self.0.contains("localhost") || self.0.contains("127.0.0.1")
    }

    /// A secure page cannot talk to an insecure, non-loopback device
    pub fn is_mixed_content(&self, secure_origin: bool) -> bool {
        secure_origin && !self.0.contains("https") && !self.is_loopback()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionTarget {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
