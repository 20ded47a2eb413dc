//! Fleet orchestration: one operation fanned out over every badge.
//!
//! Each device gets its own freshly connected session, runs the operation,
//! and is disconnected again. Devices run concurrently on an
//! `edge-executor` in batches of `max_parallel_devices`; results are
//! collected by awaiting each task handle, so no state is shared between
//! devices.
//!
//! ```text
//!  registry ──▶ batch ──▶ LocalExecutor ──▶ [connect → op → disconnect] × N ──▶ FleetReport
//! ```
//!
//! A failure on one badge becomes an `Error::Device` row in the report and
//! never reaches its siblings.

use core::fmt;
use std::path::Path;

use edge_executor::LocalExecutor;
use futures_lite::future;
use log::{debug, info, warn};

use crate::config::HubConfig;
use crate::download::{DownloadManager, DownloadSummary};
use crate::error::{Error, Result};
use crate::protocol::{EraseAllResponse, StatusResponse};
use crate::registry::DeviceRegistryEntry;
use crate::session::{BadgeSession, Sensor, Transport};

/// Upper bound on tasks alive on one executor.
const FANOUT_CAPACITY: usize = 16;

/// Opens a link to a registered badge.
pub trait TransportFactory {
    type Transport: Transport;

    fn open(&self, entry: &DeviceRegistryEntry) -> Self::Transport;
}

impl<F, T> TransportFactory for F
where
    F: Fn(&DeviceRegistryEntry) -> T,
    T: Transport,
{
    type Transport = T;

    fn open(&self, entry: &DeviceRegistryEntry) -> T {
        self(entry)
    }
}

/// Which registry entries an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Only entries whose use flag is set.
    InUse,
    /// Everything except one participant, e.g. a badge whose session the
    /// caller already holds open.
    Except(u16),
}

impl Selection {
    fn includes(self, entry: &DeviceRegistryEntry) -> bool {
        match self {
            Self::All => true,
            Self::InUse => entry.use_flag,
            Self::Except(id) => entry.participant_id != id,
        }
    }
}

// ── Reports ───────────────────────────────────────────────────

/// Result of one operation on one badge.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport<R> {
    pub participant_id: u16,
    pub address: String,
    /// Connect-and-operate cycles used.
    pub attempts: u32,
    pub outcome: Result<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// Per-device rows of a fan-out, in registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetReport<R> {
    pub devices: Vec<DeviceReport<R>>,
}

impl<R> FleetReport<R> {
    pub fn summary(&self) -> FleetSummary {
        let success = self.devices.iter().filter(|d| d.outcome.is_ok()).count();
        FleetSummary {
            success,
            failed: self.devices.len() - success,
            total: self.devices.len(),
        }
    }

    pub fn device(&self, participant_id: u16) -> Option<&DeviceReport<R>> {
        self.devices
            .iter()
            .find(|d| d.participant_id == participant_id)
    }

    pub fn successes(&self) -> impl Iterator<Item = (u16, &R)> {
        self.devices
            .iter()
            .filter_map(|d| d.outcome.as_ref().ok().map(|r| (d.participant_id, r)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (u16, &Error)> {
        self.devices
            .iter()
            .filter_map(|d| d.outcome.as_ref().err().map(|e| (d.participant_id, e)))
    }
}

// ── Health ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// A sensor expected to be recording reports disabled.
    SensorDisabled(Sensor),
    ClockNotSynced,
    LowBattery(u8),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorDisabled(sensor) => write!(f, "{sensor:?} not recording"),
            Self::ClockNotSynced => write!(f, "clock not synced"),
            Self::LowBattery(level) => write!(f, "battery low ({level}%)"),
        }
    }
}

/// Status snapshot of one badge with the problems found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHealth {
    pub participant_id: u16,
    pub battery: u8,
    pub clock_synced: bool,
    pub microphone: bool,
    pub scan: bool,
    pub imu: bool,
    pub anomalies: Vec<Anomaly>,
}

impl DeviceHealth {
    pub fn assess(
        participant_id: u16,
        status: &StatusResponse,
        expect_recording: &[Sensor],
        low_battery_percent: u8,
    ) -> Self {
        let mut anomalies: Vec<Anomaly> = expect_recording
            .iter()
            .filter(|sensor| !sensor.is_enabled(status))
            .map(|&sensor| Anomaly::SensorDisabled(sensor))
            .collect();
        if !status.clock {
            anomalies.push(Anomaly::ClockNotSynced);
        }
        if status.battery < low_battery_percent {
            anomalies.push(Anomaly::LowBattery(status.battery));
        }
        Self {
            participant_id,
            battery: status.battery,
            clock_synced: status.clock,
            microphone: status.microphone,
            scan: status.scan,
            imu: status.imu,
            anomalies,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.anomalies.is_empty()
    }
}

// ── Orchestrator ──────────────────────────────────────────────

/// A registry of badges plus the means to reach them.
pub struct Fleet<F: TransportFactory> {
    registry: Vec<DeviceRegistryEntry>,
    factory: F,
    config: HubConfig,
}

impl<F: TransportFactory> Fleet<F> {
    pub fn new(registry: Vec<DeviceRegistryEntry>, factory: F, config: HubConfig) -> Self {
        Self {
            registry,
            factory,
            config,
        }
    }

    pub fn registry(&self) -> &[DeviceRegistryEntry] {
        &self.registry
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Run `op` against every selected badge and collect one row per badge.
    ///
    /// Blocks until every device has finished.
    pub fn for_each_device<R, Op>(&self, selection: Selection, op: Op) -> FleetReport<R>
    where
        Op: AsyncFn(&DeviceRegistryEntry, &mut BadgeSession<F::Transport>) -> Result<R>,
    {
        let entries: Vec<&DeviceRegistryEntry> = self
            .registry
            .iter()
            .filter(|e| selection.includes(e))
            .collect();
        let batch = self.config.max_parallel_devices.clamp(1, FANOUT_CAPACITY);

        let mut devices = Vec::with_capacity(entries.len());
        for chunk in entries.chunks(batch) {
            let executor: LocalExecutor<'_, FANOUT_CAPACITY> = LocalExecutor::new();
            let tasks: Vec<_> = chunk
                .iter()
                .map(|entry| executor.spawn(self.run_device(entry, &op)))
                .collect();
            let rows = future::block_on(executor.run(async {
                let mut rows = Vec::with_capacity(tasks.len());
                for task in tasks {
                    rows.push(task.await);
                }
                rows
            }));
            devices.extend(rows);
        }

        let report = FleetReport { devices };
        let s = report.summary();
        info!(
            "FLEET: {} succeeded, {} failed, {} total",
            s.success, s.failed, s.total
        );
        report
    }

    async fn run_device<R, Op>(&self, entry: &DeviceRegistryEntry, op: &Op) -> DeviceReport<R>
    where
        Op: AsyncFn(&DeviceRegistryEntry, &mut BadgeSession<F::Transport>) -> Result<R>,
    {
        let label = entry.label();
        let cycles = self.config.max_retries_per_device.saturating_add(1);
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            let mut session =
                BadgeSession::new(label.clone(), self.factory.open(entry), &self.config);
            let result = match session.connect().await {
                Ok(()) => {
                    let result = op(entry, &mut session).await;
                    if let Err(e) = session.disconnect().await {
                        debug!("FLEET: {} disconnect: {}", label, e);
                    }
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() && attempts < cycles => {
                    warn!(
                        "FLEET: {} attempt {}/{} failed: {}, retrying",
                        label, attempts, cycles, e
                    );
                }
                Err(e) => {
                    warn!("FLEET: {} failed: {}", label, e);
                    break Err(Error::Device {
                        participant_id: entry.participant_id,
                        source: Box::new(e),
                    });
                }
            }
        };

        DeviceReport {
            participant_id: entry.participant_id,
            address: entry.address.clone(),
            attempts,
            outcome,
        }
    }

    // ── Convenience fan-outs ─────────────────────────────────

    /// Assign each badge its participant id, then start `sensors`.
    ///
    /// A failed assignment is logged and the sensors are started anyway.
    pub fn start_all(&self, sensors: &[Sensor], selection: Selection) -> FleetReport<()> {
        let group = self.config.group;
        self.for_each_device(selection, async |entry, session| {
            if let Err(e) = session.assign_identity(entry.participant_id, group).await {
                warn!(
                    "FLEET: {} identity assignment failed: {}",
                    entry.label(),
                    e
                );
            }
            for &sensor in sensors {
                session.start_sensor(sensor).await?;
            }
            Ok(())
        })
    }

    pub fn stop_all(&self, sensors: &[Sensor], selection: Selection) -> FleetReport<()> {
        self.for_each_device(selection, async |_, session| {
            for &sensor in sensors {
                session.stop_sensor(sensor).await?;
            }
            Ok(())
        })
    }

    /// Query every badge's status (optionally skipping one) and flag
    /// disabled sensors, unsynced clocks and low batteries.
    pub fn synchronize_all(
        &self,
        skip: Option<u16>,
        expect_recording: &[Sensor],
    ) -> FleetReport<DeviceHealth> {
        let selection = skip.map_or(Selection::All, Selection::Except);
        let threshold = self.config.low_battery_percent;
        let report = self.for_each_device(selection, async |entry, session| {
            let status = session.get_status().await?;
            Ok(DeviceHealth::assess(
                entry.participant_id,
                &status,
                expect_recording,
                threshold,
            ))
        });

        for (participant_id, health) in report.successes() {
            for anomaly in &health.anomalies {
                warn!("FLEET: participant {}: {}", participant_id, anomaly);
            }
        }
        report
    }

    pub fn erase_all(&self, selection: Selection) -> FleetReport<EraseAllResponse> {
        self.for_each_device(selection, async |_, session| session.erase_all().await)
    }

    /// Download every badge's files into `output_root/<participant id>/`.
    pub fn download_all(
        &self,
        output_root: &Path,
        selection: Selection,
    ) -> FleetReport<DownloadSummary> {
        self.for_each_device(selection, async |entry, session| {
            let dir = output_root.join(entry.participant_id.to_string());
            DownloadManager::new(session).download_all_files(&dir).await
        })
    }
}
