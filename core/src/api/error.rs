use thiserror::Error;

/// What went wrong with a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request did not complete before its timeout
    Timeout,
    /// Connection refused, DNS failure, TLS failure and friends
    Network,
    /// Backend answered 401/403
    Unauthorized,
    /// Backend answered with another non-success status
    Status,
    /// Response body was not what we expected
    Decode,
    /// Request could not be built
    Request,
}

/// Typed failure handed to the caller; `message` is safe to show to users
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Replace an empty message with an operation-specific default
    pub fn or_message(mut self, fallback: &str) -> Self {
        if self.message.trim().is_empty() {
            self.message = fallback.to_string();
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ApiErrorKind::Timeout
    }

    pub fn is_network(&self) -> bool {
        self.kind == ApiErrorKind::Network
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ApiErrorKind::Timeout
        } else if e.is_connect() {
            ApiErrorKind::Network
        } else if e.is_decode() {
            ApiErrorKind::Decode
        } else if e.is_builder() {
            ApiErrorKind::Request
        } else if e.is_request() {
            ApiErrorKind::Network
        } else {
            ApiErrorKind::Status
        };
        let mut err = ApiError::new(kind, e.to_string());
        if let Some(status) = e.status() {
            err.status = Some(status.as_u16());
        }
        err
    }
}

/// Pull a human-readable message out of an error body (`error` first, then `detail`)
pub fn message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.trim().is_empty())
}

/// Message for a failed credential login, never leaking backend internals
pub fn friendly_login_error(err: &ApiError) -> String {
    if err.kind == ApiErrorKind::Network {
        return "Cannot reach the server. Check that the backend is running and the API URL is correct."
            .to_string();
    }

    match err.status {
        Some(400) | Some(401) => "Invalid email or password. Please try again.".to_string(),
        Some(500) => {
            let lower = err.message.to_lowercase();
            if lower.contains("getaddrinfo failed") || lower.contains("name or service not known") {
                "Login service is temporarily unavailable. Please try again later.".to_string()
            } else {
                "Server error while logging in. Please try again later.".to_string()
            }
        }
        _ if !err.message.trim().is_empty() => {
            "Login failed. Please check your credentials and try again.".to_string()
        }
        _ => "Login failed. Please try again.".to_string(),
    }
}

/// Pass a raw backend message through unless it looks like a resolver/OS error
pub fn safe_login_error(raw: Option<&str>, fallback: &str) -> String {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return fallback.to_string();
    };
    let lower = raw.to_lowercase();
    if lower.contains("getaddrinfo failed") || looks_like_errno(&lower) {
        return "Login service is temporarily unavailable.".to_string();
    }
    raw.to_string()
}

// Matches "[errno <digits>]" with optional whitespace before the digits
fn looks_like_errno(lower: &str) -> bool {
    let mut rest = lower;
    while let Some(idx) = rest.find("[errno") {
        let tail = rest[idx + "[errno".len()..].trim_start();
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && tail[digits.len()..].starts_with(']') {
            return true;
        }
        rest = &rest[idx + 1..];
    }
    false
}
