// Glass event stream
//
// Uses a tokio broadcast channel so any number of front-ends (UI, CLI, tests)
// can observe notifications, navigation requests and state changes.

use super::scan::DetectionResult;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing toast
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Everything the glass client reports outward
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GlassEvent {
    /// Connected flag flipped
    ConnectionChanged {
        connected: bool,
        battery_level: Option<u8>,
    },
    ScanningChanged {
        active: bool,
    },
    /// A person was identified
    Detection(DetectionResult),
    /// The front-end should show this view
    Navigate {
        path: String,
    },
    Notify(Notification),
}

/// Event broadcaster for glass consumers
#[derive(Clone)]
pub struct GlassEventBroadcaster {
    sender: broadcast::Sender<GlassEvent>,
}

impl GlassEventBroadcaster {
    /// Create a new broadcaster with buffer size
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn broadcast(&self, event: GlassEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn notify(&self, notification: Notification) {
        self.broadcast(GlassEvent::Notify(notification));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GlassEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for GlassEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
