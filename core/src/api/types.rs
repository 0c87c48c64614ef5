//! Wire types exchanged with the MedLens backend and the glass relay.

use serde::{Deserialize, Serialize};

/// Successful login payload (face login and confirmation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmFaceLogin<'a> {
    pub user_id: &'a str,
    pub password: &'a str,
}

/// Medical fields the recognition endpoint returns for a matched person
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalInfo {
    #[serde(default)]
    pub chronic_conditions: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub emergency_notes: Option<String>,
    #[serde(default)]
    pub current_medications: Option<String>,
}

/// `POST /api/recognize` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognitionResponse {
    #[serde(rename = "match", default)]
    pub is_match: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub is_critical: bool,
    #[serde(default)]
    pub medical_info: Option<MedicalInfo>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecognitionResponse {
    /// Person id, whichever field the backend filled
    pub fn person_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.user_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRef<'a> {
    pub device_id: &'a str,
}

/// `GET /api/glass/status/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Commands queued for a device through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlassCommand {
    DisplayText {
        line1: String,
        line2: String,
        alert: bool,
        info: String,
    },
    ResetWifi,
}
