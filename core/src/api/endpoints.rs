/// Typed wrappers over the MedLens backend routes
///
/// Every call returns `Result<T, ApiError>`; the error message is already
/// user-presentable so callers decide only how to show it.
use super::client::{RequestOptions, RestClient};
use super::error::{ApiError, ApiErrorKind};
use super::types::*;
use std::time::Duration;
use tracing::debug;

const FRAME_FILE_NAME: &str = "glass_capture.jpg";

pub struct MedLensApi {
    rest: RestClient,
}

fn image_form(image: Vec<u8>, file_name: &str) -> Result<reqwest::multipart::Form, ApiError> {
    let part = reqwest::multipart::Part::bytes(image)
        .file_name(file_name.to_string())
        .mime_str("image/jpeg")
        .map_err(|e| ApiError::new(ApiErrorKind::Request, e.to_string()))?;
    Ok(reqwest::multipart::Form::new().part("image", part))
}

impl MedLensApi {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    // ---- authentication -------------------------------------------------

    /// Face login: validate a face image and receive a login payload
    pub async fn login_with_face(&self, image: Vec<u8>) -> Result<LoginResponse, ApiError> {
        let form = image_form(image, "face.jpg")?;
        self.rest
            .post_multipart("/api/login/face", form, RequestOptions::default())
            .await
            .map_err(|e| e.or_message("Login failed"))
    }

    /// Second factor after a face match; a 401 here must not wipe the session
    pub async fn confirm_face_login(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<LoginResponse, ApiError> {
        self.rest
            .post_json(
                "/api/login/face/confirm",
                &ConfirmFaceLogin { user_id, password },
                RequestOptions::skip_auth_redirect(),
            )
            .await
            .map_err(|e| e.or_message("Login failed"))
    }

    pub async fn check_health(&self) -> Result<HealthResponse, ApiError> {
        self.rest
            .get_json("/api/health", RequestOptions::default())
            .await
            .map_err(|e| e.or_message("Health check failed"))
    }

    // ---- recognition ------------------------------------------------------

    /// Submit a captured frame for face recognition
    pub async fn recognize_face(&self, frame: Vec<u8>) -> Result<RecognitionResponse, ApiError> {
        debug!(target: "rest_client", bytes = frame.len(), "Submitting frame for recognition");
        let form = image_form(frame, FRAME_FILE_NAME)?;
        self.rest
            .post_multipart("/api/recognize", form, RequestOptions::default())
            .await
            .map_err(|e| e.or_message("Recognition failed"))
    }

    // ---- devices & glass relay -------------------------------------------

    pub async fn pair_device(&self, device_id: &str) -> Result<(), ApiError> {
        self.rest
            .post_unit(
                "/api/devices/pair",
                &DeviceRef { device_id },
                RequestOptions::default(),
            )
            .await
    }

    pub async fn unpair_device(&self, device_id: &str) -> Result<(), ApiError> {
        self.rest
            .post_unit(
                "/api/devices/unpair",
                &DeviceRef { device_id },
                RequestOptions::default(),
            )
            .await
    }

    pub async fn glass_status(&self, device_id: &str) -> Result<RelayStatus, ApiError> {
        self.rest
            .get_json(
                &format!("/api/glass/status/{}", device_id),
                RequestOptions::default(),
            )
            .await
    }

    pub async fn glass_command(&self, device_id: &str, command: &GlassCommand) -> Result<(), ApiError> {
        self.rest
            .post_unit(
                &format!("/api/glass/command/{}", device_id),
                command,
                RequestOptions::default(),
            )
            .await
    }

    pub async fn glass_frame(&self, device_id: &str, timeout: Duration) -> Result<Vec<u8>, ApiError> {
        self.rest
            .get_bytes(
                &format!("/api/glass/frame/{}", device_id),
                RequestOptions::timeout(timeout),
            )
            .await
    }

    /// Relay URL serving the latest device frame
    pub fn glass_frame_url(&self, device_id: &str) -> String {
        self.rest.url(&format!("/api/glass/frame/{}", device_id))
    }
}
