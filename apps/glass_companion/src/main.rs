mod config;
use config::CompanionConfig;
use medlens_core::{GlassEvent, MedLens, NotificationKind};
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    medlens_core::init_logging("info,medlens_core=info,glass_companion=info");

    let cfg = CompanionConfig::load();
    info!(
        target: "glass_companion",
        api = %cfg.medlens.api.base_url,
        "Starting MedLens glass companion"
    );

    let medlens = MedLens::new(cfg.medlens.clone())?;
    let glass = medlens.glass.clone();

    // Presentation stand-in: log every event, follow navigation requests
    let mut events = glass.subscribe();
    let follower = glass.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GlassEvent::ConnectionChanged {
                    connected,
                    battery_level,
                }) => {
                    info!(target: "glass_companion", connected, battery = ?battery_level, "Glass connection changed");
                }
                Ok(GlassEvent::ScanningChanged { active }) => {
                    info!(target: "glass_companion", active, "Scanning state changed");
                }
                Ok(GlassEvent::Detection(d)) => {
                    info!(
                        target: "glass_companion",
                        name = %d.name,
                        confidence = d.confidence,
                        critical = d.is_critical,
                        summary = %d.medical_summary,
                        "Detection"
                    );
                }
                Ok(GlassEvent::Navigate { path }) => {
                    info!(target: "glass_companion", path = %path, "Opening profile");
                    follower.set_current_path(path);
                }
                Ok(GlassEvent::Notify(n)) => match n.kind {
                    NotificationKind::Error => {
                        error!(target: "glass_companion", title = %n.title, "{}", n.message)
                    }
                    NotificationKind::Warning => {
                        warn!(target: "glass_companion", title = %n.title, "{}", n.message)
                    }
                    _ => info!(target: "glass_companion", title = %n.title, "{}", n.message),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "glass_companion", skipped, "Event listener lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    medlens.start().await;
    if let Ok(snapshot) = serde_json::to_string(&glass.snapshot()) {
        info!(target: "glass_companion", state = %snapshot, "Glass state");
    }

    if cfg.scan_on_start {
        if glass.is_connected() {
            glass.start_scanning();
        } else {
            warn!(target: "glass_companion", "Glass not connected; scanning not started");
        }
    }

    let metrics_task = (cfg.metrics_interval_secs > 0).then(|| {
        let metrics = glass.metrics().clone();
        let period = Duration::from_secs(cfg.metrics_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                metrics.print().await;
            }
        })
    });

    if let Err(e) = signal::ctrl_c().await {
        error!(target: "glass_companion", error = %e, "Failed to listen for Ctrl+C");
    }
    info!(target: "glass_companion", "Shutting down...");

    if let Some(task) = metrics_task {
        task.abort();
    }
    medlens.shutdown().await;
    glass.metrics().print().await;
    event_task.abort();
    Ok(())
}
