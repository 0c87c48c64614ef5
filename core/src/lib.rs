// MedLens Core Library
// Session, REST client and smart glass connectivity for the MedLens client

pub mod api;
pub mod config;
pub mod glass;
pub mod session;
pub mod storage;
pub mod telemetry;
pub(crate) mod utils;

// Export core types
pub use api::{ApiError, MedLensApi, RestClient};
pub use config::{ApiConfig, GlassConfig, MedLensConfig};
pub use glass::{
    ConnectionMode, ConnectionTarget, DetectionResult, GlassEvent, MatchPolicy, Notification,
    NotificationKind, SmartGlass,
};
pub use session::{Session, SessionStore};
pub use storage::LocalStore;
pub use telemetry::{init_logging, ScanMetrics, ScanStats};

// Error types
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedLensError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Glass error: {0}")]
    Glass(#[from] glass::GlassError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, MedLensError>;

/// Client runtime: one instance per application, shared by every consumer
pub struct MedLens {
    pub config: MedLensConfig,
    pub store: Arc<LocalStore>,
    pub session: SessionStore,
    pub api: Arc<MedLensApi>,
    pub glass: SmartGlass,
}

impl MedLens {
    /// Build the client stack from configuration, opening the persisted store.
    pub fn new(config: MedLensConfig) -> Result<Self> {
        let store = match &config.storage_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::in_memory(),
        };
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: MedLensConfig, store: Arc<LocalStore>) -> Result<Self> {
        let session = SessionStore::new(Arc::clone(&store));
        let rest = RestClient::new(config.api.clone(), session.clone())?;
        let api = Arc::new(MedLensApi::new(rest));
        let glass = SmartGlass::from_config(
            &config,
            Arc::clone(&store),
            session.clone(),
            Arc::clone(&api),
        )?;

        Ok(Self {
            config,
            store,
            session,
            api,
            glass,
        })
    }

    pub async fn start(&self) {
        tracing::info!("Starting MedLens client...");
        self.glass.start().await;
        tracing::info!("MedLens client started");
    }

    pub async fn shutdown(&self) {
        tracing::info!("Shutting down MedLens client...");
        self.glass.shutdown();
        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "Failed to flush local store on shutdown");
        }
        tracing::info!("MedLens client shut down");
    }
}
