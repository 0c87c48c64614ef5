//! Capture/recognition loop.
//!
//! While scanning, every `scan_interval` one frame is pulled from the glass,
//! submitted for recognition and, on a match, reported outward. At most one
//! cycle is in flight; a tick that finds one running is dropped.

use super::client::SmartGlass;
use super::events::{GlassEvent, Notification};
use super::task::PeriodicTask;
use crate::api::types::{MedicalInfo, RecognitionResponse};
use crate::api::{ApiError, MedLensApi};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Face recognition backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, frame: Vec<u8>) -> Result<RecognitionResponse, ApiError>;
}

#[async_trait]
impl Recognizer for MedLensApi {
    async fn recognize(&self, frame: Vec<u8>) -> Result<RecognitionResponse, ApiError> {
        self.recognize_face(frame).await
    }
}

/// What the loop does once someone is identified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// A match ends the scan session
    #[default]
    StopOnMatch,
    /// Keep scanning; repeated detections of the last person are ignored
    DedupRepeats,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" | "stop_on_match" => Ok(MatchPolicy::StopOnMatch),
            "dedup" | "dedup_repeats" | "continue" => Ok(MatchPolicy::DedupRepeats),
            other => Err(format!("unknown match policy: {}", other)),
        }
    }
}

/// A positive identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub person_id: Option<String>,
    pub name: String,
    /// 0.0..=1.0
    pub confidence: f64,
    pub is_critical: bool,
    /// One-line medical hint for the glass display
    pub medical_summary: String,
}

impl DetectionResult {
    /// `None` unless the backend reported a match
    pub fn from_response(response: &RecognitionResponse) -> Option<Self> {
        if !response.is_match {
            return None;
        }
        Some(Self {
            person_id: response.person_id().map(str::to_string),
            name: response
                .name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            confidence: response.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            is_critical: response.is_critical,
            medical_summary: medical_summary(response.medical_info.as_ref(), response.is_critical),
        })
    }

    pub fn profile_path(&self) -> Option<String> {
        self.person_id.as_ref().map(|id| format!("/profile/{}", id))
    }
}

/// Result of one scan cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was still in flight
    Skipped,
    NoMatch,
    Matched(DetectionResult),
    /// Same person as last time under [`MatchPolicy::DedupRepeats`]
    Repeated(DetectionResult),
    /// Connection target changed mid-cycle; result discarded
    Stale,
    Failed(String),
}

fn first_item(value: Option<&str>) -> Option<String> {
    value?
        .split(['\n', ','])
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(str::to_string)
}

/// Short medical hint: first chronic condition, first allergy, else a note
/// or medication, else a critical flag
pub fn medical_summary(info: Option<&MedicalInfo>, is_critical: bool) -> String {
    let mut parts = Vec::new();

    if let Some(info) = info {
        if let Some(chronic) = first_item(info.chronic_conditions.as_deref()) {
            parts.push(chronic);
        }
        if let Some(allergy) = first_item(info.allergies.as_deref()) {
            parts.push(format!("Allergy: {}", allergy));
        }
        if parts.is_empty() {
            let note = info
                .emergency_notes
                .as_deref()
                .filter(|n| !n.is_empty())
                .or(info.current_medications.as_deref());
            if let Some(note) = first_item(note) {
                parts.push(note);
            }
        }
    }

    if parts.is_empty() && is_critical {
        parts.push("CRITICAL PATIENT".to_string());
    }
    parts.join(" | ")
}

/// Releases the in-flight flag however the cycle ends
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SmartGlass {
    pub fn toggle_scanning(&self) {
        if self.is_scanning() {
            self.stop_scanning();
        } else {
            self.start_scanning();
        }
    }

    /// Run one cycle now and then every `scan_interval`. No-op if already
    /// scanning or while the device is paired to another account.
    pub fn start_scanning(&self) {
        if self.has_ownership_conflict() {
            warn!(target: "glass_scan", target_id = %self.target(), "Device is paired to another account; not scanning");
            return;
        }
        let mut slot = self
            .inner
            .scan_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            return;
        }

        self.inner.state().is_scanning = true;
        info!(target: "glass_scan", target_id = %self.target(), "Scanning started");

        let weak = Arc::downgrade(&self.inner);
        *slot = Some(PeriodicTask::spawn(
            "glass_scan",
            self.inner.config.scan_interval(),
            move || {
                let glass = SmartGlass::from_weak(&weak);
                async move {
                    match glass {
                        Some(glass) => {
                            // Ticks never wait on a cycle; a busy cycle makes this one skip
                            tokio::spawn(async move {
                                glass.scan_once().await;
                            });
                            true
                        }
                        None => false,
                    }
                }
            },
        ));
        drop(slot);

        let glass = self.clone();
        tokio::spawn(async move {
            glass.scan_once().await;
        });
        self.inner
            .events
            .broadcast(GlassEvent::ScanningChanged { active: true });
    }

    /// Stop the scan timer and clear the flag. A cycle already in flight
    /// finishes but its outcome no longer schedules anything.
    pub fn stop_scanning(&self) {
        self.inner.bump_scan_generation();
        let task = self
            .inner
            .scan_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let was_scanning = std::mem::replace(&mut self.inner.state().is_scanning, false);
        if let Some(task) = task {
            task.stop();
        }
        if was_scanning {
            info!(target: "glass_scan", "Scanning stopped");
            self.inner
                .events
                .broadcast(GlassEvent::ScanningChanged { active: false });
        }
    }

    /// One capture/recognize/react cycle. Never fails; every error is
    /// logged and folded into the outcome.
    pub async fn scan_once(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.inner.cycle_in_flight) else {
            debug!(target: "glass_scan", "Previous scan still in progress, skipping");
            self.inner.metrics.record_skip().await;
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let outcome = self.run_cycle().await;
        self.inner
            .metrics
            .record_cycle(&outcome, started.elapsed())
            .await;
        debug!(target: "glass_scan", outcome = ?outcome, "Scan cycle complete");
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let target = self.target();
        if target.is_empty() {
            return CycleOutcome::Failed("no glass target configured".to_string());
        }
        if self.has_ownership_conflict() {
            return CycleOutcome::Failed("device is paired to another account".to_string());
        }
        let generation = self.inner.generation();
        let scan_generation = self.inner.scan_generation();
        let is_stale = || {
            self.inner.is_stale(generation) || self.inner.scan_generation() != scan_generation
        };

        debug!(target: "glass_scan", target_id = %target, "Requesting capture from glass");
        let frame = match self.inner.transport.capture_frame(&target).await {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_timeout() {
                    warn!(target: "glass_scan", target_id = %target, "Capture timed out; check the glass connection");
                } else {
                    warn!(target: "glass_scan", target_id = %target, error = %e, "Capture failed");
                }
                return CycleOutcome::Failed(e.to_string());
            }
        };
        if is_stale() {
            return CycleOutcome::Stale;
        }
        debug!(target: "glass_scan", bytes = frame.len(), "Capture received");
        if !target.is_cloud() {
            self.mark_link_alive();
        }

        let response = match self.inner.recognizer.recognize(frame).await {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "glass_scan", error = %e, "Recognition failed");
                return CycleOutcome::Failed(e.message().to_string());
            }
        };
        if is_stale() {
            return CycleOutcome::Stale;
        }
        if self.has_ownership_conflict() {
            return CycleOutcome::Failed("device is paired to another account".to_string());
        }

        let Some(detection) = DetectionResult::from_response(&response) else {
            debug!(target: "glass_scan", "No match found");
            return CycleOutcome::NoMatch;
        };

        let policy = self.inner.config.match_policy;
        let mirror = {
            let mut st = self.inner.state();
            let repeated = policy == MatchPolicy::DedupRepeats
                && detection.person_id.is_some()
                && st
                    .last_detection
                    .as_ref()
                    .map(|last| last.person_id == detection.person_id)
                    .unwrap_or(false);
            if repeated {
                None
            } else {
                st.last_detection = Some(detection.clone());
                Some(st.mirror_recognition)
            }
        };
        let Some(mirror) = mirror else {
            debug!(target: "glass_scan", name = %detection.name, "Same person as last detection; ignoring");
            return CycleOutcome::Repeated(detection);
        };

        info!(
            target: "glass_scan",
            name = %detection.name,
            confidence = detection.confidence,
            "Match found"
        );

        if mirror {
            self.update_display(
                "MATCH FOUND",
                &detection.name,
                detection.is_critical,
                &detection.medical_summary,
            )
            .await;
        }

        self.inner
            .events
            .broadcast(GlassEvent::Detection(detection.clone()));
        self.inner.events.notify(Notification::success(
            "Glass Detection",
            format!("Identified: {}", detection.name),
        ));

        if let Some(path) = detection.profile_path() {
            let current = self.current_path();
            if current.trim_end_matches('/') != path {
                info!(target: "glass_scan", path = %path, "Navigating to profile");
                self.inner.events.broadcast(GlassEvent::Navigate { path });
            } else {
                debug!(target: "glass_scan", "Already on patient profile");
            }
        }

        if policy == MatchPolicy::StopOnMatch {
            self.stop_scanning();
        }
        CycleOutcome::Matched(detection)
    }
}
