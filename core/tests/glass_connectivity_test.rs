mod common;

use common::{drain, error_notifications, FakeRecognizer, Harness};
use medlens_core::api::types::{GlassCommand, RecognitionResponse};
use medlens_core::glass::{CycleOutcome, GlassError, CheckOutcome};
use medlens_core::{ConnectionMode, GlassConfig, GlassEvent, MatchPolicy};
use std::time::Duration;

#[tokio::test]
async fn local_ok_connects_and_starts_one_poll_task() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(77), None);
    let glass = h.glass();
    assert_eq!(glass.mode(), ConnectionMode::Local);

    let outcome = glass.check_connection().await;
    assert_eq!(
        outcome,
        CheckOutcome::Connected {
            battery_level: Some(77)
        }
    );
    assert!(glass.is_connected());
    assert_eq!(glass.battery_level(), Some(77));
    assert!(glass.is_polling());
    assert!(h.store.get("medlens_glass_last_ok").is_some());
}

#[tokio::test(start_paused = true)]
async fn repeated_checks_keep_a_single_poll_task() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(60), None);
    let glass = h.glass();

    glass.check_connection().await;
    glass.check_connection().await;
    assert_eq!(h.transport.status_check_count(), 2);

    // One poll task means one extra status check per period
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(h.transport.status_check_count(), 3);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.transport.status_check_count(), 4);

    glass.shutdown();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.transport.status_check_count(), 4);
}

#[tokio::test]
async fn cloud_offline_disconnects_without_pairing() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.offline();
    let glass = h.glass();
    assert_eq!(glass.mode(), ConnectionMode::Cloud);

    assert_eq!(glass.check_connection().await, CheckOutcome::Offline);
    assert!(!glass.is_connected());
    assert_eq!(h.transport.pair_count(), 0);
    assert!(!glass.is_polling());
}

#[tokio::test]
async fn cloud_online_pairs_with_current_user() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.online(Some(90), Some("doc-1"));
    let glass = h.glass();

    assert!(matches!(
        glass.check_connection().await,
        CheckOutcome::Connected { .. }
    ));
    assert!(glass.is_connected());
    assert_eq!(h.transport.pair_count(), 1);
}

#[tokio::test]
async fn ownership_conflict_notifies_once_and_never_pairs() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.online(Some(90), Some("someone-else"));
    let glass = h.glass();
    let mut events = glass.subscribe();

    assert_eq!(glass.check_connection().await, CheckOutcome::OwnershipConflict);
    assert!(!glass.is_connected());
    assert_eq!(h.transport.pair_count(), 0);

    let errors = error_notifications(&drain(&mut events));
    assert_eq!(errors, vec!["Device in use".to_string()]);

    // Still owned elsewhere on the next poll: no second notification
    assert_eq!(glass.check_connection().await, CheckOutcome::OwnershipConflict);
    assert!(error_notifications(&drain(&mut events)).is_empty());
}

#[tokio::test]
async fn three_consecutive_failures_disconnect() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(50), None);
    let glass = h.glass();
    glass.check_connection().await;

    h.transport
        .set_status(Err(GlassError::Network("connection refused".into())));
    for expected in 1..=2 {
        let outcome = glass.check_connection().await;
        assert_eq!(
            outcome,
            CheckOutcome::Failed {
                consecutive_failures: expected,
                disconnected: false
            }
        );
        assert!(glass.is_connected());
        assert_eq!(glass.battery_level(), Some(50));
    }

    let outcome = glass.check_connection().await;
    assert_eq!(
        outcome,
        CheckOutcome::Failed {
            consecutive_failures: 3,
            disconnected: true
        }
    );
    assert!(!glass.is_connected());
    assert_eq!(glass.battery_level(), None);
}

#[tokio::test]
async fn local_status_other_than_ok_counts_as_failure() {
    let h = Harness::new("192.168.4.1");
    h.transport.offline();
    let glass = h.glass();

    assert!(matches!(
        glass.check_connection().await,
        CheckOutcome::Failed {
            consecutive_failures: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn success_resets_failure_count() {
    let h = Harness::new("192.168.4.1");
    let glass = h.glass();
    h.transport.set_status(Err(GlassError::Timeout));
    glass.check_connection().await;
    glass.check_connection().await;
    assert_eq!(glass.connection_state().consecutive_failures, 2);

    h.transport.online(None, None);
    glass.check_connection().await;
    assert_eq!(glass.connection_state().consecutive_failures, 0);
}

#[tokio::test]
async fn mixed_content_failure_raises_security_error() {
    let h = Harness::new("192.168.4.1");
    let glass = h.glass_with(GlassConfig::default(), true);
    let mut events = glass.subscribe();

    glass.check_connection().await;
    assert_eq!(
        error_notifications(&drain(&mut events)),
        vec!["Security Error".to_string()]
    );
}

#[tokio::test]
async fn loopback_target_is_not_mixed_content() {
    let h = Harness::new("localhost:8001");
    let glass = h.glass_with(GlassConfig::default(), true);
    let mut events = glass.subscribe();

    glass.check_connection().await;
    assert!(error_notifications(&drain(&mut events)).is_empty());
}

#[tokio::test]
async fn recent_success_is_restored_at_startup() {
    let now = chrono::Utc::now().timestamp_millis();

    let h = Harness::new("192.168.4.1");
    h.store
        .set("medlens_glass_last_ok", (now - 44_000).to_string())
        .unwrap();
    assert!(h.glass().is_connected());

    let h = Harness::new("192.168.4.1");
    h.store
        .set("medlens_glass_last_ok", (now - 45_000).to_string())
        .unwrap();
    assert!(!h.glass().is_connected());

    let h = Harness::new("medlens-glass-01");
    assert!(!h.glass().is_connected());
}

#[tokio::test]
async fn update_display_only_when_connected() {
    let h = Harness::new("192.168.4.1");
    let glass = h.glass();

    glass.update_display("HELLO", "WORLD", false, "").await;
    assert!(h.transport.sent_commands().is_empty());

    h.transport.online(Some(10), None);
    glass.check_connection().await;
    glass.update_display("HELLO", "WORLD", true, "note").await;
    assert_eq!(
        h.transport.sent_commands(),
        vec![GlassCommand::DisplayText {
            line1: "HELLO".into(),
            line2: "WORLD".into(),
            alert: true,
            info: "note".into(),
        }]
    );
}

#[tokio::test]
async fn display_errors_are_swallowed() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(None, None);
    let glass = h.glass();
    glass.check_connection().await;
    h.transport.fail_commands_with(GlassError::Status(500));

    glass.update_display("A", "B", false, "").await;
    assert!(glass.is_connected());
}

#[tokio::test]
async fn reset_wifi_treats_timeout_as_success() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(None, None);
    let glass = h.glass();
    glass.check_connection().await;

    h.transport.fail_commands_with(GlassError::Timeout);
    assert!(glass.reset_wifi().await);
    assert!(!glass.is_connected());
    assert_eq!(h.transport.sent_commands(), vec![GlassCommand::ResetWifi]);
}

#[tokio::test]
async fn reset_wifi_reports_hard_failures() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(None, None);
    let glass = h.glass();
    glass.check_connection().await;

    h.transport.fail_commands_with(GlassError::Status(500));
    assert!(!glass.reset_wifi().await);
    assert!(glass.is_connected());
}

#[tokio::test]
async fn disconnect_unpairs_cloud_and_blocks_auto_check() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.online(Some(80), Some("doc-1"));
    let glass = h.glass();
    glass.check_connection().await;
    assert!(glass.is_polling());

    glass.disconnect().await;
    assert_eq!(h.transport.unpair_count(), 1);
    assert!(!glass.is_connected());
    assert!(!glass.is_polling());
    assert!(glass.connection_state().manually_disconnected);
    assert_eq!(glass.start().await, CheckOutcome::ManuallyDisconnected);

    // Choosing a target again clears the manual flag
    let outcome = glass.set_target("medlens-glass-02").await;
    assert!(matches!(outcome, CheckOutcome::Connected { .. }));
    assert!(!glass.connection_state().manually_disconnected);
    assert_eq!(
        h.store.get("medlens_glass_ip").as_deref(),
        Some("medlens-glass-02")
    );
}

#[tokio::test]
async fn disconnect_local_does_not_unpair() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(None, None);
    let glass = h.glass();
    glass.check_connection().await;

    glass.disconnect().await;
    assert_eq!(h.transport.unpair_count(), 0);
    assert!(!glass.is_connected());
}

#[tokio::test]
async fn viewing_urls_follow_target() {
    let h = Harness::new("192.168.4.1");
    let glass = h.glass();
    assert_eq!(glass.stream_url(), "http://192.168.4.1/stream");
    assert_eq!(glass.snapshot_url(), "http://192.168.4.1/capture");
}

#[tokio::test]
async fn overlapping_scan_cycles_are_skipped() {
    let recognizer = FakeRecognizer::gated();
    let h = Harness::with_recognizer("192.168.4.1", recognizer.clone());
    let glass = h.glass();

    let first = {
        let glass = glass.clone();
        tokio::spawn(async move { glass.scan_once().await })
    };
    while recognizer.call_count() == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(glass.scan_once().await, CycleOutcome::Skipped);
    assert_eq!(glass.scan_once().await, CycleOutcome::Skipped);
    assert_eq!(recognizer.call_count(), 1);

    recognizer.release();
    assert_eq!(first.await.unwrap(), CycleOutcome::NoMatch);

    let stats = glass.metrics().snapshot().await;
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.no_matches, 1);
}

#[tokio::test(start_paused = true)]
async fn scanning_stops_after_a_match() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(70), None);
    h.recognizer.respond_with(RecognitionResponse {
        is_match: true,
        user_id: Some("p-42".into()),
        name: Some("John Doe".into()),
        confidence: Some(0.91),
        is_critical: true,
        ..Default::default()
    });
    let glass = h.glass();
    glass.check_connection().await;
    let mut events = glass.subscribe();

    glass.start_scanning();
    assert!(glass.is_scanning());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!glass.is_scanning());
    let detection = glass.last_detection().unwrap();
    assert_eq!(detection.name, "John Doe");
    assert_eq!(detection.medical_summary, "CRITICAL PATIENT");

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, GlassEvent::Navigate { path } if path == "/profile/p-42")));
    assert!(events
        .iter()
        .any(|e| matches!(e, GlassEvent::ScanningChanged { active: false })));

    // Stopped: no further captures
    let captures = h.transport.captures.load(std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        h.transport.captures.load(std::sync::atomic::Ordering::SeqCst),
        captures
    );
}

#[tokio::test(start_paused = true)]
async fn scan_ticks_on_interval_until_stopped() {
    let h = Harness::new("192.168.4.1");
    let glass = h.glass();

    glass.start_scanning();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.recognizer.call_count(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.recognizer.call_count(), 2);

    glass.toggle_scanning();
    assert!(!glass.is_scanning());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.recognizer.call_count(), 2);
}

#[tokio::test]
async fn failed_checks_stop_scanning_at_threshold() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(None, None);
    let glass = h.glass();
    glass.check_connection().await;
    glass.start_scanning();

    h.transport.set_status(Err(GlassError::Timeout));
    glass.check_connection().await;
    glass.check_connection().await;
    assert!(glass.is_scanning());
    glass.check_connection().await;
    assert!(!glass.is_scanning());
}

fn jane() -> RecognitionResponse {
    RecognitionResponse {
        is_match: true,
        id: Some("u1".into()),
        name: Some("Jane".into()),
        confidence: Some(0.97),
        ..Default::default()
    }
}

#[tokio::test]
async fn device_owned_elsewhere_cannot_be_scanned() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.online(Some(90), Some("someone-else"));
    h.recognizer.respond_with(jane());
    let glass = h.glass();

    assert_eq!(glass.check_connection().await, CheckOutcome::OwnershipConflict);
    assert!(glass.has_ownership_conflict());

    assert!(matches!(glass.scan_once().await, CycleOutcome::Failed(_)));
    assert!(!glass.is_connected());
    assert!(h.transport.sent_commands().is_empty());
    assert_eq!(h.transport.capture_count(), 0);
    assert_eq!(h.recognizer.call_count(), 0);

    glass.start_scanning();
    assert!(!glass.is_scanning());

    // Once the relay reports our account again, scanning is allowed
    h.transport.online(Some(90), Some("doc-1"));
    glass.check_connection().await;
    assert!(!glass.has_ownership_conflict());
    assert!(glass.is_connected());
}

#[tokio::test]
async fn cloud_frame_does_not_revive_offline_device() {
    let h = Harness::new("medlens-glass-01");
    h.login("doc-1");
    h.transport.offline();
    let glass = h.glass();

    assert_eq!(glass.check_connection().await, CheckOutcome::Offline);
    assert_eq!(glass.scan_once().await, CycleOutcome::NoMatch);
    assert_eq!(h.transport.capture_count(), 1);
    assert!(!glass.is_connected());
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_still_polls() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(40), None);
    let config = GlassConfig {
        poll_interval_ms: 0,
        ..GlassConfig::default()
    };
    let glass = h.glass_with(config, false);

    glass.check_connection().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(glass.is_polling());
    assert!(h.transport.status_check_count() > 1);
    glass.shutdown();
}

#[tokio::test]
async fn status_check_in_flight_during_disconnect_is_discarded() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(80), None);
    h.transport.gate_status_checks();
    let glass = h.glass();

    let pending = {
        let glass = glass.clone();
        tokio::spawn(async move { glass.check_connection().await })
    };
    while h.transport.status_check_count() == 0 {
        tokio::task::yield_now().await;
    }

    glass.disconnect().await;
    h.transport.release_status_check();

    assert_eq!(pending.await.unwrap(), CheckOutcome::Stale);
    assert!(!glass.is_connected());
    assert!(!glass.is_polling());
    assert!(h.store.get("medlens_glass_last_ok").is_none());
}

#[tokio::test]
async fn cycle_in_flight_during_target_change_is_discarded() {
    let recognizer = FakeRecognizer::gated();
    recognizer.respond_with(jane());
    let h = Harness::with_recognizer("192.168.4.1", recognizer.clone());
    let glass = h.glass();
    let mut events = glass.subscribe();

    let pending = {
        let glass = glass.clone();
        tokio::spawn(async move { glass.scan_once().await })
    };
    while recognizer.call_count() == 0 {
        tokio::task::yield_now().await;
    }

    glass.set_target("192.168.4.2").await;
    recognizer.release();

    assert_eq!(pending.await.unwrap(), CycleOutcome::Stale);
    assert!(glass.last_detection().is_none());
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, GlassEvent::Navigate { .. } | GlassEvent::Detection(_))));
}

#[tokio::test]
async fn stopping_scan_mid_cycle_suppresses_reaction() {
    let recognizer = FakeRecognizer::gated();
    recognizer.respond_with(jane());
    let h = Harness::with_recognizer("192.168.4.1", recognizer.clone());
    let glass = h.glass();
    let mut events = glass.subscribe();

    let pending = {
        let glass = glass.clone();
        tokio::spawn(async move { glass.scan_once().await })
    };
    while recognizer.call_count() == 0 {
        tokio::task::yield_now().await;
    }

    glass.stop_scanning();
    recognizer.release();

    assert_eq!(pending.await.unwrap(), CycleOutcome::Stale);
    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, GlassEvent::Navigate { .. } | GlassEvent::Notify(_))));
    assert!(h.transport.sent_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dedup_policy_keeps_scanning_after_a_match() {
    let h = Harness::new("192.168.4.1");
    h.transport.online(Some(70), None);
    h.recognizer.respond_with(jane());
    let config = GlassConfig {
        match_policy: MatchPolicy::DedupRepeats,
        ..GlassConfig::default()
    };
    let glass = h.glass_with(config, false);
    glass.check_connection().await;
    let mut events = glass.subscribe();

    glass.start_scanning();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.recognizer.call_count(), 1);
    assert!(glass.is_scanning());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.recognizer.call_count(), 2);
    assert!(glass.is_scanning());

    let stats = glass.metrics().snapshot().await;
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.repeats, 1);

    let navigations = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, GlassEvent::Navigate { .. }))
        .count();
    assert_eq!(navigations, 1);
    glass.shutdown();
}
