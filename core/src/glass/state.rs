//! Connection bookkeeping, kept free of I/O so the transitions are easy to test.

use serde::{Deserialize, Serialize};

/// Best-effort belief about device reachability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub battery_level: Option<u8>,
    pub consecutive_failures: u32,
    /// Set by an explicit disconnect; suppresses auto-probing until the target changes
    pub manually_disconnected: bool,
}

/// What a failed status check did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureEffect {
    /// Below the threshold; previous belief kept
    Tolerated,
    /// Threshold reached; the link is now down
    Disconnected,
}

impl ConnectionState {
    /// State at startup: connected only if the last successful status check is younger than `window_ms`
    pub fn restored(last_ok_ms: Option<i64>, now_ms: i64, window_ms: i64) -> Self {
        Self {
            is_connected: recently_connected(last_ok_ms, now_ms, window_ms),
            ..Self::default()
        }
    }

    /// Returns true when this flips the state to connected
    pub fn record_success(&mut self, battery_level: Option<u8>) -> bool {
        let was_connected = self.is_connected;
        self.is_connected = true;
        self.consecutive_failures = 0;
        self.battery_level = battery_level;
        !was_connected
    }

    pub fn record_failure(&mut self, threshold: u32) -> FailureEffect {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= threshold {
            self.force_disconnect();
            FailureEffect::Disconnected
        } else {
            FailureEffect::Tolerated
        }
    }

    /// Returns true when this flips the state to disconnected
    pub fn force_disconnect(&mut self) -> bool {
        let was_connected = self.is_connected;
        self.is_connected = false;
        self.battery_level = None;
        was_connected
    }
}

/// Whether a persisted "last OK" timestamp still vouches for the device
pub fn recently_connected(last_ok_ms: Option<i64>, now_ms: i64, window_ms: i64) -> bool {
    match last_ok_ms {
        Some(last) if last > 0 => now_ms - last < window_ms,
        _ => false,
    }
}

/// Device batteries report a float percentage; clamp into 0..=100
pub fn battery_percent(raw: Option<f64>) -> Option<u8> {
    raw.filter(|v| v.is_finite())
        .map(|v| v.round().clamp(0.0, 100.0) as u8)
}
