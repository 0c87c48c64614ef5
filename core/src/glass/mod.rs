//! Smart glass companion device: connectivity, commands and the
//! capture/recognition loop.
mod client;
mod events;
mod scan;
pub mod state;
mod target;
pub mod task;
mod transport;

pub use client::{GlassSnapshot, CheckOutcome, SmartGlass, SmartGlassBuilder};
pub use events::{GlassEvent, GlassEventBroadcaster, Notification, NotificationKind};
pub use scan::{medical_summary, CycleOutcome, DetectionResult, MatchPolicy, Recognizer};
pub use state::ConnectionState;
pub use target::{ConnectionMode, ConnectionTarget};
pub use transport::{DeviceStatus, GlassError, GlassTransport, HttpGlassTransport};
