//! Shared helpers.

/// Wall-clock timestamp in milliseconds since UNIX epoch.
#[inline]
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
