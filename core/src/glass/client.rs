/// Smart glass connectivity client
///
/// Owns the connection target, the reachability belief, the status poll task
/// and the scan task. One instance per application; clones share state.
///
/// Network calls happen without holding any lock. Every result is checked
/// against a generation counter that `set_target` and `disconnect` bump, so
/// a response that arrives after the user moved on is dropped instead of
/// resurrecting old state.
use super::events::{GlassEvent, GlassEventBroadcaster, Notification};
use super::scan::{DetectionResult, MatchPolicy, Recognizer};
use super::state::{ConnectionState, FailureEffect};
use super::target::{ConnectionMode, ConnectionTarget};
use super::task::PeriodicTask;
use super::transport::{GlassError, GlassTransport, HttpGlassTransport};
use crate::api::types::GlassCommand;
use crate::api::MedLensApi;
use crate::config::{GlassConfig, MedLensConfig};
use crate::session::SessionStore;
use crate::storage::LocalStore;
use crate::telemetry::ScanMetrics;
use crate::utils::now_ms;
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub(crate) const TARGET_KEY: &str = "medlens_glass_ip";
pub(crate) const LAST_OK_KEY: &str = "medlens_glass_last_ok";
pub(crate) const MIRROR_KEY: &str = "medlens_glass_mirror_recognition";

/// Result of one status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Connected { battery_level: Option<u8> },
    /// Relay says the device is offline
    Offline,
    /// Device is paired to another account
    OwnershipConflict,
    Failed {
        consecutive_failures: u32,
        disconnected: bool,
    },
    /// Target changed or user disconnected while the status check was in flight
    Stale,
    /// Automatic probing is off until the target changes
    ManuallyDisconnected,
    NoTarget,
}

/// Point-in-time view of the client for presentation
#[derive(Debug, Clone, Serialize)]
pub struct GlassSnapshot {
    pub target: ConnectionTarget,
    pub mode: ConnectionMode,
    pub is_connected: bool,
    pub battery_level: Option<u8>,
    pub consecutive_failures: u32,
    pub manually_disconnected: bool,
    /// Relay reported the device paired to another account
    pub ownership_conflict: bool,
    pub is_scanning: bool,
    pub mirror_recognition: bool,
    pub last_detection: Option<DetectionResult>,
}

pub(super) struct GlassState {
    pub(super) target: ConnectionTarget,
    pub(super) connection: ConnectionState,
    /// Set by a status check that found the device paired elsewhere; blocks scanning
    /// until a status check confirms ownership or the target changes
    pub(super) ownership_conflict: bool,
    pub(super) is_scanning: bool,
    pub(super) mirror_recognition: bool,
    pub(super) last_detection: Option<DetectionResult>,
    pub(super) current_path: String,
}

pub(super) struct Inner {
    pub(super) config: GlassConfig,
    secure_origin: bool,
    store: Arc<LocalStore>,
    session: SessionStore,
    pub(super) transport: Arc<dyn GlassTransport>,
    pub(super) recognizer: Arc<dyn Recognizer>,
    pub(super) events: GlassEventBroadcaster,
    pub(super) metrics: ScanMetrics,
    state: Mutex<GlassState>,
    generation: AtomicU64,
    /// Bumped by `stop_scanning`; a cycle from an older scan session does not react
    scan_generation: AtomicU64,
    pub(super) cycle_in_flight: AtomicBool,
    poll_task: Mutex<Option<PeriodicTask>>,
    pub(super) scan_task: Mutex<Option<PeriodicTask>>,
}

impl Inner {
    pub(super) fn state(&self) -> MutexGuard<'_, GlassState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(super) fn is_stale(&self, generation: u64) -> bool {
        self.generation() != generation
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(super) fn scan_generation(&self) -> u64 {
        self.scan_generation.load(Ordering::SeqCst)
    }

    pub(super) fn bump_scan_generation(&self) {
        self.scan_generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builder for [`SmartGlass`]
pub struct SmartGlassBuilder {
    config: GlassConfig,
    secure_origin: bool,
    store: Arc<LocalStore>,
    session: SessionStore,
    transport: Arc<dyn GlassTransport>,
    recognizer: Arc<dyn Recognizer>,
    events: GlassEventBroadcaster,
}

impl SmartGlassBuilder {
    pub fn config(mut self, config: GlassConfig) -> Self {
        self.config = config;
        self
    }

    pub fn secure_origin(mut self, secure: bool) -> Self {
        self.secure_origin = secure;
        self
    }

    pub fn events(mut self, events: GlassEventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> SmartGlass {
        let target = self
            .store
            .get(TARGET_KEY)
            .map(ConnectionTarget::new)
            .unwrap_or_else(|| ConnectionTarget::new(self.config.default_target.clone()));
        let last_ok = self
            .store
            .get(LAST_OK_KEY)
            .and_then(|v| v.parse::<i64>().ok());
        let connection =
            ConnectionState::restored(last_ok, now_ms(), self.config.recent_ok_window_ms);
        let mirror_recognition = !matches!(self.store.get(MIRROR_KEY).as_deref(), Some("false"));

        debug!(
            target: "smart_glass",
            target_id = %target,
            restored_connected = connection.is_connected,
            "Glass client initialized"
        );

        SmartGlass {
            inner: Arc::new(Inner {
                config: self.config,
                secure_origin: self.secure_origin,
                store: self.store,
                session: self.session,
                transport: self.transport,
                recognizer: self.recognizer,
                events: self.events,
                metrics: ScanMetrics::new(),
                state: Mutex::new(GlassState {
                    target,
                    connection,
                    ownership_conflict: false,
                    is_scanning: false,
                    mirror_recognition,
                    last_detection: None,
                    current_path: String::from("/"),
                }),
                generation: AtomicU64::new(0),
                scan_generation: AtomicU64::new(0),
                cycle_in_flight: AtomicBool::new(false),
                poll_task: Mutex::new(None),
                scan_task: Mutex::new(None),
            }),
        }
    }
}

/// Smart glass service handle. Cheap to clone.
#[derive(Clone)]
pub struct SmartGlass {
    pub(super) inner: Arc<Inner>,
}

impl SmartGlass {
    pub fn builder(
        store: Arc<LocalStore>,
        session: SessionStore,
        transport: Arc<dyn GlassTransport>,
        recognizer: Arc<dyn Recognizer>,
    ) -> SmartGlassBuilder {
        SmartGlassBuilder {
            config: GlassConfig::default(),
            secure_origin: false,
            store,
            session,
            transport,
            recognizer,
            events: GlassEventBroadcaster::default(),
        }
    }

    /// Production wiring: HTTP transport plus backend recognition
    pub fn from_config(
        config: &MedLensConfig,
        store: Arc<LocalStore>,
        session: SessionStore,
        api: Arc<MedLensApi>,
    ) -> Result<Self> {
        let transport = HttpGlassTransport::new(config.glass.clone(), Arc::clone(&api))?;
        Ok(Self::builder(store, session, Arc::new(transport), api)
            .config(config.glass.clone())
            .secure_origin(config.secure_origin)
            .build())
    }

    pub(super) fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ---- observation ------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<GlassEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &GlassEventBroadcaster {
        &self.inner.events
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.inner.metrics
    }

    pub fn target(&self) -> ConnectionTarget {
        self.inner.state().target.clone()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.target().mode()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().connection.is_connected
    }

    pub fn battery_level(&self) -> Option<u8> {
        self.inner.state().connection.battery_level
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state().connection.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.state().is_scanning
    }

    pub fn has_ownership_conflict(&self) -> bool {
        self.inner.state().ownership_conflict
    }

    pub fn last_detection(&self) -> Option<DetectionResult> {
        self.inner.state().last_detection.clone()
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.inner.config.match_policy
    }

    pub fn snapshot(&self) -> GlassSnapshot {
        let st = self.inner.state();
        GlassSnapshot {
            target: st.target.clone(),
            mode: st.target.mode(),
            is_connected: st.connection.is_connected,
            battery_level: st.connection.battery_level,
            consecutive_failures: st.connection.consecutive_failures,
            manually_disconnected: st.connection.manually_disconnected,
            ownership_conflict: st.ownership_conflict,
            is_scanning: st.is_scanning,
            mirror_recognition: st.mirror_recognition,
            last_detection: st.last_detection.clone(),
        }
    }

    /// Whether the status poll task is alive
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poll_task)
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    // ---- preferences --------------------------------------------------------

    pub fn mirror_recognition(&self) -> bool {
        self.inner.state().mirror_recognition
    }

    /// Whether recognition results are also pushed to the glass display
    pub fn set_mirror_recognition(&self, enabled: bool) {
        self.inner.state().mirror_recognition = enabled;
        if let Err(e) = self
            .inner
            .store
            .set(MIRROR_KEY, if enabled { "true" } else { "false" })
        {
            warn!(target: "smart_glass", error = %e, "Failed to persist mirror preference");
        }
    }

    /// Tell the client which view the user is on, so a match for the person
    /// already displayed does not navigate again
    pub fn set_current_path(&self, path: impl Into<String>) {
        self.inner.state().current_path = path.into();
    }

    pub fn current_path(&self) -> String {
        self.inner.state().current_path.clone()
    }

    // ---- lifecycle ------------------------------------------------------------

    /// Initial automatic status check, unless the user disconnected by hand
    pub async fn start(&self) -> CheckOutcome {
        let (empty, manual) = {
            let st = self.inner.state();
            (st.target.is_empty(), st.connection.manually_disconnected)
        };
        if empty {
            return CheckOutcome::NoTarget;
        }
        if manual {
            debug!(target: "smart_glass", "Manually disconnected; skipping automatic status check");
            return CheckOutcome::ManuallyDisconnected;
        }
        self.check_connection().await
    }

    /// Switch to another device. Tears down the old connection lifetime,
    /// clears the manual-disconnect flag and checks the new target.
    pub async fn set_target(&self, raw: impl Into<String>) -> CheckOutcome {
        let target = ConnectionTarget::new(raw);
        self.stop_scanning();
        self.stop_polling();
        self.inner.bump_generation();
        {
            let mut st = self.inner.state();
            st.target = target.clone();
            st.connection = ConnectionState::default();
            st.ownership_conflict = false;
        }
        if let Err(e) = self.inner.store.set(TARGET_KEY, target.as_str()) {
            warn!(target: "smart_glass", error = %e, "Failed to persist glass target");
        }
        self.broadcast_connection();
        info!(target: "smart_glass", target_id = %target, mode = ?target.mode(), "Glass target changed");

        if target.is_empty() {
            return CheckOutcome::NoTarget;
        }
        self.check_connection().await
    }

    /// Stop every background task without touching connection state
    pub fn shutdown(&self) {
        self.stop_scanning();
        self.stop_polling();
    }

    // ---- connectivity -----------------------------------------------------------

    /// Check device status once and update the reachability belief
    pub async fn check_connection(&self) -> CheckOutcome {
        let target = self.target();
        if target.is_empty() {
            return CheckOutcome::NoTarget;
        }
        let generation = self.inner.generation();

        let result = self.inner.transport.fetch_status(&target).await;
        if self.inner.is_stale(generation) {
            debug!(target: "smart_glass", target_id = %target, "Dropping stale status check result");
            return CheckOutcome::Stale;
        }

        match (target.mode(), result) {
            (ConnectionMode::Cloud, Ok(status)) if status.online => {
                let current_user = self.inner.session.user_id();
                if let (Some(owner), Some(me)) = (status.owner_id.as_deref(), current_user.as_deref()) {
                    if owner != me {
                        let already_known =
                            std::mem::replace(&mut self.inner.state().ownership_conflict, true);
                        if !already_known {
                            warn!(target: "smart_glass", device = %target, "Device is paired to another account");
                            self.inner.events.notify(Notification::error(
                                "Device in use",
                                "This glass is already paired to another account.",
                            ));
                        }
                        self.force_disconnect();
                        return CheckOutcome::OwnershipConflict;
                    }
                }

                self.inner.state().ownership_conflict = false;
                self.mark_connected(status.battery_level);
                self.ensure_polling();

                if let Err(e) = self.inner.transport.pair(target.as_str()).await {
                    warn!(target: "smart_glass", device = %target, error = %e, "Pairing device failed");
                }
                CheckOutcome::Connected {
                    battery_level: status.battery_level,
                }
            }
            (ConnectionMode::Cloud, Ok(_)) => {
                if self.is_connected() {
                    info!(target: "smart_glass", device = %target, "Cloud relay reports offline, marking disconnected");
                }
                self.force_disconnect();
                self.inner.state().connection.consecutive_failures = 0;
                CheckOutcome::Offline
            }
            (ConnectionMode::Local, Ok(status)) if status.online => {
                self.mark_connected(status.battery_level);
                if let Err(e) = self.inner.store.set(LAST_OK_KEY, now_ms().to_string()) {
                    warn!(target: "smart_glass", error = %e, "Failed to persist last-ok timestamp");
                }
                self.ensure_polling();
                CheckOutcome::Connected {
                    battery_level: status.battery_level,
                }
            }
            (ConnectionMode::Local, Ok(_)) => self.record_check_failure(
                &target,
                &GlassError::Decode("device status is not \"ok\"".to_string()),
            ),
            (_, Err(e)) => self.record_check_failure(&target, &e),
        }
    }

    fn record_check_failure(&self, target: &ConnectionTarget, err: &GlassError) -> CheckOutcome {
        warn!(target: "smart_glass", target_id = %target, error = %err, "Connection check failed");

        if err.is_network() && !target.is_cloud() {
            if target.is_mixed_content(self.inner.secure_origin) {
                error!(
                    target: "smart_glass",
                    target_id = %target,
                    "Mixed content: insecure glass cannot be reached from a secure origin"
                );
                self.inner.events.notify(Notification::error(
                    "Security Error",
                    "Browser blocked connection to insecure Glass IP from HTTPS site.",
                ));
            } else {
                debug!(target: "smart_glass", "Check that the glass (or mock) is running and reachable");
            }
        }

        let threshold = self.inner.config.failure_threshold;
        let (effect, failures, flipped) = {
            let mut st = self.inner.state();
            let was_connected = st.connection.is_connected;
            let effect = st.connection.record_failure(threshold);
            let flipped = effect == FailureEffect::Disconnected && was_connected;
            (effect, st.connection.consecutive_failures, flipped)
        };

        let disconnected = effect == FailureEffect::Disconnected;
        if disconnected {
            if flipped {
                info!(target: "smart_glass", failures, "Marking glass disconnected after repeated failures");
            }
            self.stop_scanning();
            if flipped {
                self.broadcast_connection();
            }
        }

        CheckOutcome::Failed {
            consecutive_failures: failures,
            disconnected,
        }
    }

    pub(super) fn mark_connected(&self, battery_level: Option<u8>) {
        let flipped = self.inner.state().connection.record_success(battery_level);
        if flipped {
            info!(target: "smart_glass", target_id = %self.target(), "Glass connected");
            self.broadcast_connection();
        }
    }

    /// A frame arrived straight from a local device, so the link is up;
    /// battery is left as last reported. Cloud connectivity is decided by
    /// relay status only.
    pub(super) fn mark_link_alive(&self) {
        let flipped = {
            let mut st = self.inner.state();
            let battery = st.connection.battery_level;
            st.connection.record_success(battery)
        };
        if flipped {
            self.broadcast_connection();
        }
    }

    fn force_disconnect(&self) {
        self.stop_scanning();
        let flipped = self.inner.state().connection.force_disconnect();
        if flipped {
            self.broadcast_connection();
        }
    }

    fn broadcast_connection(&self) {
        let (connected, battery_level) = {
            let st = self.inner.state();
            (st.connection.is_connected, st.connection.battery_level)
        };
        self.inner.events.broadcast(GlassEvent::ConnectionChanged {
            connected,
            battery_level,
        });
    }

    /// Start the status poll task unless one is already running
    fn ensure_polling(&self) {
        let mut slot = lock(&self.inner.poll_task);
        if slot.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn("glass_status_poll", self.inner.config.poll_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(glass) = SmartGlass::from_weak(&weak) else {
                    return false;
                };
                if glass.inner.state().connection.manually_disconnected {
                    return false;
                }
                glass.check_connection().await;
                true
            }
        });
        *slot = Some(task);
    }

    fn stop_polling(&self) {
        let task = lock(&self.inner.poll_task).take();
        if let Some(task) = task {
            task.stop();
        }
    }

    // ---- commands ----------------------------------------------------------------

    /// Show two lines (plus alert flag and detail text) on the glass.
    /// No-op while disconnected; failures are logged, never returned.
    pub async fn update_display(&self, line1: &str, line2: &str, alert: bool, info: &str) {
        let (connected, target) = {
            let st = self.inner.state();
            (st.connection.is_connected, st.target.clone())
        };
        if !connected || target.is_empty() {
            return;
        }

        let command = GlassCommand::DisplayText {
            line1: line1.to_string(),
            line2: line2.to_string(),
            alert,
            info: info.to_string(),
        };
        if let Err(e) = self.inner.transport.send_command(&target, &command).await {
            error!(target: "smart_glass", target_id = %target, error = %e, "Failed to update glass display");
        }
    }

    /// Ask the glass to forget its WiFi credentials and reboot.
    ///
    /// The device stops answering while it restarts, so a timeout counts as
    /// success. Returns false only when there is no target or the command
    /// definitely failed.
    pub async fn reset_wifi(&self) -> bool {
        let target = self.target();
        if target.is_empty() {
            return false;
        }

        match self
            .inner
            .transport
            .send_command(&target, &GlassCommand::ResetWifi)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                info!(target: "smart_glass", target_id = %target, "WiFi reset timed out; device is likely rebooting");
            }
            Err(e) => {
                error!(target: "smart_glass", target_id = %target, error = %e, "Failed to reset glass wifi");
                return false;
            }
        }

        let flipped = {
            let mut st = self.inner.state();
            let was = st.connection.is_connected;
            st.connection.is_connected = false;
            was
        };
        if flipped {
            self.broadcast_connection();
        }
        true
    }

    /// Client-side disconnect: stop tasks, release a cloud pairing and stay
    /// disconnected until the target is changed
    pub async fn disconnect(&self) {
        self.stop_scanning();
        self.stop_polling();
        self.inner.bump_generation();

        let (target, connected) = {
            let st = self.inner.state();
            (st.target.clone(), st.connection.is_connected)
        };
        if target.is_cloud() && connected {
            if let Err(e) = self.inner.transport.unpair(target.as_str()).await {
                warn!(target: "smart_glass", device = %target, error = %e, "Unpairing device failed");
            }
        }

        {
            let mut st = self.inner.state();
            st.connection.force_disconnect();
            st.connection.manually_disconnected = true;
        }
        info!(target: "smart_glass", target_id = %target, "Glass disconnected by user");
        self.broadcast_connection();
    }

    // ---- viewing URLs --------------------------------------------------------------

    pub fn stream_url(&self) -> String {
        self.inner.transport.stream_url(&self.target())
    }

    pub fn snapshot_url(&self) -> String {
        self.inner.transport.snapshot_url(&self.target())
    }
}
