/// Thin HTTP wrapper around the MedLens backend
///
/// Attaches `Authorization: Bearer <token>` and `X-User-ID` from the current
/// session to every request. A 401/403 response clears the session and fires
/// the registered auth-error hook, unless the call opts out with
/// [`RequestOptions::skip_auth_redirect`].
use super::error::{message_from_body, ApiError, ApiErrorKind};
use crate::config::ApiConfig;
use crate::session::SessionStore;
use crate::{MedLensError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

type AuthErrorHook = Arc<dyn Fn() + Send + Sync>;

/// Per-call overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Overrides the client-wide timeout
    pub timeout: Option<Duration>,
    /// Do not clear the session on 401/403 (used by login confirmation)
    pub skip_auth_redirect: bool,
}

impl RequestOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn skip_auth_redirect() -> Self {
        Self {
            skip_auth_redirect: true,
            ..Self::default()
        }
    }
}

/// Backend REST client. Cheap to clone.
#[derive(Clone)]
pub struct RestClient {
    config: ApiConfig,
    http_client: reqwest::Client,
    session: SessionStore,
    on_auth_error: Arc<Mutex<Option<AuthErrorHook>>>,
}

impl RestClient {
    pub fn new(config: ApiConfig, session: SessionStore) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| MedLensError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            session,
            on_auth_error: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Register a callback run after a 401/403 cleared the session
    pub fn register_auth_error_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.on_auth_error.lock() {
            *slot = Some(Arc::new(hook));
        }
    }

    fn request(&self, method: Method, path: &str, opts: RequestOptions) -> RequestBuilder {
        let mut builder = self.http_client.request(method, self.url(path));
        if let Some(token) = self.session.access_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(user_id) = self.session.user_id() {
            builder = builder.header("X-User-ID", user_id);
        }
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, opts: RequestOptions) -> std::result::Result<Response, ApiError> {
        let response = builder.send().await.map_err(ApiError::from)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = message_from_body(&body)
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        let unauthorized = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
        if unauthorized && !opts.skip_auth_redirect {
            self.handle_auth_error();
        }

        let kind = if unauthorized {
            ApiErrorKind::Unauthorized
        } else {
            ApiErrorKind::Status
        };
        debug!(target: "rest_client", status = %status, message = %message, "Backend returned error");
        Err(ApiError::new(kind, message).with_status(status.as_u16()))
    }

    fn handle_auth_error(&self) {
        warn!(target: "rest_client", "Authentication rejected; clearing session");
        if let Err(e) = self.session.clear() {
            warn!(target: "rest_client", error = %e, "Failed to clear session");
        }
        let hook = self.on_auth_error.lock().ok().and_then(|slot| slot.clone());
        if let Some(hook) = hook {
            hook();
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> std::result::Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Decode, format!("Invalid response body: {}", e)))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path, opts), opts).await?;
        Self::decode(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        let builder = self.request(Method::POST, path, opts).json(body);
        let response = self.send(builder, opts).await?;
        Self::decode(response).await
    }

    /// POST whose response body is irrelevant
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> std::result::Result<(), ApiError> {
        let builder = self.request(Method::POST, path, opts).json(body);
        self.send(builder, opts).await.map(|_| ())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        opts: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        let builder = self.request(Method::POST, path, opts).multipart(form);
        let response = self.send(builder, opts).await?;
        Self::decode(response).await
    }

    /// Raw body download (relay frames)
    pub async fn get_bytes(&self, path: &str, opts: RequestOptions) -> std::result::Result<Vec<u8>, ApiError> {
        let response = self.send(self.request(Method::GET, path, opts), opts).await?;
        let bytes = response.bytes().await.map_err(ApiError::from)?;
        Ok(bytes.to_vec())
    }
}
