//! Hub configuration parameters
//!
//! All tunable parameters for talking to a badge fleet. Every field has a
//! default, so a JSON file only needs to name the values it overrides.

use core::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::messages::FILES_PER_PAGE;

/// Sensor parameters sent with start requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorDefaults {
    /// Microphone mode: 0 = stereo, 1 = mono
    pub microphone_mode: u8,
    /// Proximity scan window (ms)
    pub scan_window: u16,
    /// Proximity scan interval (ms)
    pub scan_interval: u16,
    /// Accelerometer full-scale range (g)
    pub imu_acc_fsr: u16,
    /// Gyroscope full-scale range (deg/s)
    pub imu_gyr_fsr: u16,
    /// IMU sample rate (Hz)
    pub imu_datarate: u16,
}

impl Default for SensorDefaults {
    fn default() -> Self {
        Self {
            microphone_mode: 0,
            scan_window: 250,
            scan_interval: 1000,
            imu_acc_fsr: 4,
            imu_gyr_fsr: 1000,
            imu_datarate: 50,
        }
    }
}

/// Core hub configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    // --- Timing ---
    /// Per-call response budget (milliseconds)
    pub call_timeout_ms: u64,
    /// Budget for erase-all, which the badge acknowledges only when done
    pub erase_timeout_ms: u64,
    /// Delay between connect attempts (milliseconds, 0 = none)
    pub connect_backoff_ms: u64,

    // --- Retries ---
    /// Transport connect attempts before giving up on a badge
    pub connect_attempts: u32,
    /// Extra connect-and-operate cycles per device in a fleet fan-out
    pub max_retries_per_device: u32,

    // --- Fleet ---
    /// Devices operated concurrently
    pub max_parallel_devices: usize,
    /// Battery level (0-100%) below which a badge is reported
    pub low_battery_percent: u8,
    /// Group number assigned to badges on start
    pub group: u8,
    /// LED blink duration for identify (seconds)
    pub identify_secs: u16,

    // --- Files ---
    /// Entries requested per listing page
    pub list_page_size: u8,

    pub sensors: SensorDefaults,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            // Timing
            call_timeout_ms: 15_000,
            erase_timeout_ms: 60_000,
            connect_backoff_ms: 0,

            // Retries
            connect_attempts: 15,
            max_retries_per_device: 0,

            // Fleet
            max_parallel_devices: 8,
            low_battery_percent: 10,
            group: 1,
            identify_secs: 10,

            // Files
            list_page_size: 3,

            sensors: SensorDefaults::default(),
        }
    }
}

impl HubConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing hub configuration")?;
        config.validate().context("validating hub configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 || self.erase_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero"));
        }
        if self.connect_attempts == 0 {
            return Err(Error::Config("connect_attempts must be at least 1"));
        }
        if self.list_page_size == 0 || usize::from(self.list_page_size) > FILES_PER_PAGE {
            return Err(Error::Config("list_page_size must be 1..=3"));
        }
        if self.low_battery_percent > 100 {
            return Err(Error::Config("low_battery_percent must be 0-100"));
        }
        if self.max_parallel_devices == 0 {
            return Err(Error::Config("max_parallel_devices must be at least 1"));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn erase_timeout(&self) -> Duration {
        Duration::from_millis(self.erase_timeout_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}
