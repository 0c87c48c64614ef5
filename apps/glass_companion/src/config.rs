use std::fs;
use std::path::{Path, PathBuf};

use medlens_core::config::MIN_INTERVAL_MS;
use medlens_core::{MatchPolicy, MedLensConfig};

/// Configuration for the companion binary
#[derive(Clone, Debug)]
pub struct CompanionConfig {
    pub medlens: MedLensConfig,
    /// Start the recognition loop as soon as the glass is connected
    pub scan_on_start: bool,
    /// Log scan metrics this often; 0 disables
    pub metrics_interval_secs: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            medlens: MedLensConfig::default(),
            scan_on_start: std::env::var("GLASS_SCAN_ON_START")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
            metrics_interval_secs: std::env::var("GLASS_METRICS_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        }
    }
}

impl CompanionConfig {
    /// Load configuration from a TOML file (path via GLASS_COMPANION_CONFIG or ./glass_companion.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("GLASS_COMPANION_CONFIG")
            .unwrap_or_else(|_| "glass_companion.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "glass_companion", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match parse(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "glass_companion", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "glass_companion", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

fn parse(s: &str) -> Result<CompanionToml, toml::de::Error> {
    toml::from_str::<CompanionToml>(s)
}

// TOML overlay

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct CompanionToml {
    storage_path: Option<PathBuf>,
    secure_origin: Option<bool>,
    scan_on_start: Option<bool>,
    metrics_interval_secs: Option<u64>,
    api: Option<ApiToml>,
    glass: Option<GlassToml>,
}

impl CompanionToml {
    fn overlay(self, mut base: CompanionConfig) -> CompanionConfig {
        if let Some(p) = self.storage_path {
            base.medlens.storage_path = Some(p);
        }
        if let Some(v) = self.secure_origin {
            base.medlens.secure_origin = v;
        }
        if let Some(v) = self.scan_on_start {
            base.scan_on_start = v;
        }
        if let Some(v) = self.metrics_interval_secs {
            base.metrics_interval_secs = v;
        }
        if let Some(a) = self.api {
            a.apply(&mut base.medlens);
        }
        if let Some(g) = self.glass {
            g.apply(&mut base.medlens);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ApiToml {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
}

impl ApiToml {
    fn apply(self, cfg: &mut MedLensConfig) {
        if let Some(v) = self.base_url {
            cfg.api.base_url = v;
        }
        if let Some(v) = self.request_timeout_ms {
            cfg.api.request_timeout_ms = v;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct GlassToml {
    target: Option<String>,
    poll_interval_ms: Option<u64>,
    scan_interval_ms: Option<u64>,
    status_timeout_ms: Option<u64>,
    capture_timeout_ms: Option<u64>,
    failure_threshold: Option<u32>,
    match_policy: Option<MatchPolicy>,
}

impl GlassToml {
    fn apply(self, cfg: &mut MedLensConfig) {
        let g = &mut cfg.glass;
        if let Some(v) = self.target {
            g.default_target = v;
        }
        if let Some(v) = self.poll_interval_ms {
            g.poll_interval_ms = v.max(MIN_INTERVAL_MS);
        }
        if let Some(v) = self.scan_interval_ms {
            g.scan_interval_ms = v.max(MIN_INTERVAL_MS);
        }
        if let Some(v) = self.status_timeout_ms {
            g.status_timeout_ms = v;
        }
        if let Some(v) = self.capture_timeout_ms {
            g.capture_timeout_ms = v;
        }
        if let Some(v) = self.failure_threshold {
            g.failure_threshold = v.max(1);
        }
        if let Some(v) = self.match_policy {
            g.match_policy = v;
        }
    }
}
