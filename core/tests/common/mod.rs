#![allow(dead_code)]

use async_trait::async_trait;
use medlens_core::api::types::{GlassCommand, LoginResponse, RecognitionResponse};
use medlens_core::glass::{
    ConnectionTarget, DeviceStatus, GlassError, GlassTransport, Recognizer, SmartGlass,
};
use medlens_core::{ApiError, GlassConfig, GlassEvent, LocalStore, SessionStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Semaphore};

/// Scriptable transport that records every call
pub struct FakeTransport {
    status: Mutex<Option<Result<DeviceStatus, GlassError>>>,
    status_gated: AtomicBool,
    status_gate: Semaphore,
    command_error: Mutex<Option<GlassError>>,
    pub status_checks: AtomicUsize,
    pub pairs: AtomicUsize,
    pub unpairs: AtomicUsize,
    pub captures: AtomicUsize,
    pub commands: Mutex<Vec<GlassCommand>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(None),
            status_gated: AtomicBool::new(false),
            status_gate: Semaphore::new(0),
            command_error: Mutex::new(None),
            status_checks: AtomicUsize::new(0),
            pairs: AtomicUsize::new(0),
            unpairs: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        })
    }

    /// From now on every status check waits for one [`FakeTransport::release_status_check`]
    pub fn gate_status_checks(&self) {
        self.status_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_status_check(&self) {
        self.status_gate.add_permits(1);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: Result<DeviceStatus, GlassError>) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn online(&self, battery_level: Option<u8>, owner_id: Option<&str>) {
        self.set_status(Ok(DeviceStatus {
            online: true,
            battery_level,
            owner_id: owner_id.map(str::to_string),
        }));
    }

    pub fn offline(&self) {
        self.set_status(Ok(DeviceStatus::default()));
    }

    pub fn fail_commands_with(&self, err: GlassError) {
        *self.command_error.lock().unwrap() = Some(err);
    }

    pub fn status_check_count(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.load(Ordering::SeqCst)
    }

    pub fn unpair_count(&self) -> usize {
        self.unpairs.load(Ordering::SeqCst)
    }

    pub fn sent_commands(&self) -> Vec<GlassCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl GlassTransport for FakeTransport {
    async fn fetch_status(&self, _target: &ConnectionTarget) -> Result<DeviceStatus, GlassError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        if self.status_gated.load(Ordering::SeqCst) {
            self.status_gate.acquire().await.unwrap().forget();
        }
        self.status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(GlassError::Network("connection refused".into())))
    }

    async fn send_command(
        &self,
        _target: &ConnectionTarget,
        command: &GlassCommand,
    ) -> Result<(), GlassError> {
        self.commands.lock().unwrap().push(command.clone());
        match self.command_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn capture_frame(&self, _target: &ConnectionTarget) -> Result<Vec<u8>, GlassError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    async fn pair(&self, _device_id: &str) -> Result<(), GlassError> {
        self.pairs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unpair(&self, _device_id: &str) -> Result<(), GlassError> {
        self.unpairs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stream_url(&self, target: &ConnectionTarget) -> String {
        target.device_url("stream")
    }

    fn snapshot_url(&self, target: &ConnectionTarget) -> String {
        target.device_url("capture")
    }
}

/// Recognizer that answers "no match", optionally blocking until released
pub struct FakeRecognizer {
    pub calls: AtomicUsize,
    gate: Option<Semaphore>,
    response: Mutex<RecognitionResponse>,
}

impl FakeRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: None,
            response: Mutex::new(RecognitionResponse::default()),
        })
    }

    /// Every call waits for one [`FakeRecognizer::release`]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
            response: Mutex::new(RecognitionResponse::default()),
        })
    }

    pub fn respond_with(&self, response: RecognitionResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn recognize(&self, _frame: Vec<u8>) -> Result<RecognitionResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub store: Arc<LocalStore>,
    pub session: SessionStore,
    pub transport: Arc<FakeTransport>,
    pub recognizer: Arc<FakeRecognizer>,
}

impl Harness {
    pub fn new(target: &str) -> Self {
        Self::with_recognizer(target, FakeRecognizer::new())
    }

    pub fn with_recognizer(target: &str, recognizer: Arc<FakeRecognizer>) -> Self {
        let store = Arc::new(LocalStore::in_memory());
        store.set("medlens_glass_ip", target).unwrap();
        let session = SessionStore::new(Arc::clone(&store));
        Self {
            store,
            session,
            transport: FakeTransport::new(),
            recognizer,
        }
    }

    pub fn login(&self, user_id: &str) {
        self.session
            .set_session(&LoginResponse {
                user_id: user_id.to_string(),
                token: Some("tok-123".to_string()),
                name: Some("Dr. Test".to_string()),
                role: Some("user".to_string()),
            })
            .unwrap();
    }

    pub fn glass(&self) -> SmartGlass {
        self.glass_with(GlassConfig::default(), false)
    }

    pub fn glass_with(&self, config: GlassConfig, secure_origin: bool) -> SmartGlass {
        let transport: Arc<dyn GlassTransport> = self.transport.clone();
        let recognizer: Arc<dyn Recognizer> = self.recognizer.clone();
        SmartGlass::builder(
            Arc::clone(&self.store),
            self.session.clone(),
            transport,
            recognizer,
        )
        .config(config)
        .secure_origin(secure_origin)
        .build()
    }
}

/// Everything queued on the receiver right now
pub fn drain(rx: &mut broadcast::Receiver<GlassEvent>) -> Vec<GlassEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn error_notifications(events: &[GlassEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            GlassEvent::Notify(n) if n.kind == medlens_core::NotificationKind::Error => {
                Some(n.title.clone())
            }
            _ => None,
        })
        .collect()
}
