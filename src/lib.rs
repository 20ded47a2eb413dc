//! Badge hub library.
//!
//! Host-side protocol engine for a fleet of wearable sensor badges: the
//! binary message codec and framing, per-badge sessions with
//! request/response correlation and timeouts, chunked file download with
//! CRC-32 verification, and fleet-wide fan-out with per-device failure
//! isolation. The wireless link itself is supplied by the caller through
//! [`session::Transport`].

#![deny(unused_must_use)]

pub mod config;
pub mod download;
pub mod fleet;
pub mod protocol;
pub mod registry;
pub mod session;

mod error;

// Links the std time driver that async-io-mini timers run on.
use embassy_time as _;

pub use config::{HubConfig, SensorDefaults};
pub use download::{DownloadManager, DownloadOutcome, DownloadProgress, DownloadSummary};
pub use error::{Error, Result, WireError};
pub use fleet::{
    Anomaly, DeviceHealth, DeviceReport, Fleet, FleetReport, FleetSummary, Selection,
    TransportFactory,
};
pub use registry::{DeviceRegistryEntry, load_registry, load_registry_file};
pub use session::{BadgeSession, NotificationSink, Sensor, SessionState, Transport};
