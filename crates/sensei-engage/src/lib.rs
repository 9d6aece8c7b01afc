pub mod controller;
pub mod preset;
pub mod scoring;
pub mod tracker;

pub use controller::{EngagementMonitor, EngagementSession};
pub use preset::Sensitivity;
pub use scoring::{DistractionKind, DistractionLogEntry, FocusEngine, FocusSignal, FocusSnapshot};
pub use tracker::{TrackerEvent, TrackerEventKind};
