//! Device session: one link to one badge.
//!
//! Flow per call: drop frames left over from earlier calls, clear the
//! mailbox for the expected response kind →
//! frame and write the request → decode inbound frames, routing each into
//! its mailbox, until the expected slot fills or the timeout fires.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Idle ◀──▶ AwaitingResponse
//!      ▲                          │                 │              │
//!      └──── attempts exhausted ──┘                 └── link drop / write error / disconnect()
//! ```
//!
//! Every request method takes `&mut self`, so at most one request is in
//! flight per session. Callers that share a badge serialize above this
//! layer.

pub mod inbound;
pub mod mailbox;
pub mod transport;

use core::time::Duration;
use std::sync::Arc;

use async_io_mini::Timer;
use futures_lite::future;
use log::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    BadgeAssignment, DownloadChunkResponse, EraseAllResponse, FileChecksumResponse,
    FrameDecoder, FreeSpaceResponse, ImuDataResponse, ListFilesResponse, Request, Response,
    ResponseKind, StartDownloadResponse, StartImuRequest, StartImuResponse,
    StartMicrophoneRequest, StartMicrophoneResponse, StartScanRequest, StartScanResponse,
    StatusRequest, StatusResponse, Timestamp, encode_frame, fixed,
};

pub use inbound::{InboundQueue, NotificationSink};
pub use mailbox::Mailboxes;
pub use transport::Transport;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Idle,
    AwaitingResponse,
}

/// Recording sensors on a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Microphone,
    Scan,
    Imu,
}

impl Sensor {
    /// Start order used by `start_all_sensors`.
    pub const ALL: [Sensor; 3] = [Sensor::Scan, Sensor::Microphone, Sensor::Imu];

    /// Whether `status` reports this sensor as running.
    pub fn is_enabled(self, status: &StatusResponse) -> bool {
        match self {
            Self::Microphone => status.microphone,
            Self::Scan => status.scan,
            Self::Imu => status.imu,
        }
    }
}

macro_rules! expect_response {
    ($response:expr, $variant:ident) => {
        match $response {
            Response::$variant(inner) => Ok(inner),
            other => Err(Error::UnexpectedResponse {
                expected: ResponseKind::$variant,
                got: other.kind(),
            }),
        }
    };
}

/// One logical connection to one badge.
pub struct BadgeSession<T: Transport> {
    label: String,
    transport: T,
    inbound: Arc<InboundQueue>,
    decoder: FrameDecoder,
    mailboxes: Mailboxes,
    state: SessionState,
    config: HubConfig,
    timeout: Duration,
}

impl<T: Transport> BadgeSession<T> {
    pub fn new(label: impl Into<String>, transport: T, config: &HubConfig) -> Self {
        Self {
            label: label.into(),
            transport,
            inbound: Arc::new(InboundQueue::new()),
            decoder: FrameDecoder::new(),
            mailboxes: Mailboxes::new(),
            state: SessionState::Disconnected,
            config: config.clone(),
            timeout: config.call_timeout(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Current state, accounting for a link drop reported by the transport.
    pub fn state(&self) -> SessionState {
        if self.inbound.is_disconnected() {
            SessionState::Disconnected
        } else {
            self.state
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Idle | SessionState::AwaitingResponse
        )
    }

    /// Response budget used by the high-level operations.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    // ── Link management ──────────────────────────────────────

    /// Connect, retrying up to the configured attempt budget.
    ///
    /// Each attempt gets a fresh inbound queue so bytes from an earlier
    /// link never reach this one.
    pub async fn connect(&mut self) -> Result<()> {
        let attempts = self.config.connect_attempts.max(1);
        let backoff = self.config.connect_backoff();
        self.state = SessionState::Connecting;

        let mut last = String::new();
        for attempt in 1..=attempts {
            let inbound = Arc::new(InboundQueue::new());
            match self
                .transport
                .connect(NotificationSink::new(inbound.clone()))
                .await
            {
                Ok(()) => {
                    self.inbound = inbound;
                    self.decoder.reset();
                    self.mailboxes.clear_all();
                    self.state = SessionState::Idle;
                    info!(
                        "BADGE[{}]: connected (attempt {}/{})",
                        self.label, attempt, attempts
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "BADGE[{}]: connect attempt {}/{} failed: {}",
                        self.label, attempt, attempts, e
                    );
                    last = e.to_string();
                }
            }
            if attempt < attempts && !backoff.is_zero() {
                Timer::after(backoff).await;
            }
        }

        self.state = SessionState::Disconnected;
        Err(Error::ConnectFailed { attempts, last })
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.transport.disconnect().await;
        self.state = SessionState::Disconnected;
        info!("BADGE[{}]: disconnected", self.label);
        result.map_err(|e| Error::Transport(e.to_string()))
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.inbound.is_disconnected() && self.state != SessionState::Disconnected {
            info!("BADGE[{}]: link dropped by peer", self.label);
            self.state = SessionState::Disconnected;
        }
        match self.state {
            SessionState::Idle | SessionState::AwaitingResponse => Ok(()),
            SessionState::Disconnected | SessionState::Connecting => Err(Error::Disconnected),
        }
    }

    // ── Request/response core ────────────────────────────────

    /// Frame and write `request`. Does not wait for any response.
    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        self.ensure_connected()?;
        let frame = encode_frame(&request.encode())?;
        debug!(
            "BADGE[{}]: -> tag {} ({} bytes)",
            self.label,
            request.tag(),
            frame.len()
        );
        if let Err(e) = self.transport.write(&frame).await {
            warn!("BADGE[{}]: write failed: {}", self.label, e);
            self.state = SessionState::Disconnected;
            return Err(Error::Transport(e.to_string()));
        }
        Ok(())
    }

    /// Read one whole frame from the inbound queue, decode it and route it
    /// to its mailbox. Suspends until enough bytes have arrived.
    pub async fn receive_one_response(&mut self) -> Result<ResponseKind> {
        loop {
            let decoder = &mut self.decoder;
            let decoded = self
                .inbound
                .with_bytes(|bytes| decoder.decode(bytes).map(Response::decode));

            match decoded {
                Some(Ok(response)) => {
                    let kind = self.mailboxes.deliver(response);
                    debug!("BADGE[{}]: <- {:?}", self.label, kind);
                    return Ok(kind);
                }
                Some(Err(e)) => {
                    warn!("BADGE[{}]: malformed frame: {}", self.label, e);
                    return Err(e.into());
                }
                None => {}
            }

            if self.inbound.is_disconnected() {
                self.ensure_connected()?;
            }
            self.inbound.wait().await;
        }
    }

    /// Drop every complete frame already buffered. Called before a new
    /// request so a reply that missed an earlier deadline cannot answer it.
    fn discard_buffered(&mut self) {
        loop {
            let decoder = &mut self.decoder;
            let decoded = self
                .inbound
                .with_bytes(|bytes| decoder.decode(bytes).map(Response::decode));
            match decoded {
                Some(Ok(stale)) => {
                    debug!("BADGE[{}]: dropped stale {:?}", self.label, stale.kind());
                }
                Some(Err(e)) => {
                    warn!("BADGE[{}]: dropped malformed stale frame: {}", self.label, e);
                }
                None => return,
            }
        }
    }

    async fn await_mailbox(&mut self, kind: ResponseKind) -> Result<Response> {
        loop {
            if let Some(response) = self.mailboxes.take(kind) {
                return Ok(response);
            }
            self.receive_one_response().await?;
        }
    }

    /// Send `request` and wait up to `timeout` for a response of `kind`.
    ///
    /// On timeout the session stays connected and usable.
    pub async fn call(
        &mut self,
        request: &Request,
        kind: ResponseKind,
        timeout: Duration,
    ) -> Result<Response> {
        self.ensure_connected()?;
        self.discard_buffered();
        self.mailboxes.clear(kind);
        self.send_request(request).await?;
        self.state = SessionState::AwaitingResponse;

        let result = future::or(self.await_mailbox(kind), async move {
            Timer::after(timeout).await;
            Err(Error::Timeout {
                kind,
                after: timeout,
            })
        })
        .await;

        if self.state == SessionState::AwaitingResponse {
            self.state = SessionState::Idle;
        }
        if let Err(e @ Error::Timeout { .. }) = &result {
            warn!("BADGE[{}]: {}", self.label, e);
            // A half-read frame would misalign everything after it.
            self.decoder.reset();
            self.inbound.with_bytes(|bytes| bytes.clear());
        }
        result
    }

    // ── Status ───────────────────────────────────────────────

    pub async fn get_status(&mut self) -> Result<StatusResponse> {
        self.status(None).await
    }

    /// Query status while assigning the badge a participant id and group.
    pub async fn assign_identity(&mut self, id: u16, group: u8) -> Result<StatusResponse> {
        self.status(Some(BadgeAssignment { id, group })).await
    }

    async fn status(&mut self, assignment: Option<BadgeAssignment>) -> Result<StatusResponse> {
        let request = Request::Status(StatusRequest {
            timestamp: Timestamp::now(),
            assignment,
        });
        let response = self.call(&request, ResponseKind::Status, self.timeout).await?;
        expect_response!(response, Status)
    }

    // ── Sensors ──────────────────────────────────────────────

    pub async fn start_microphone(&mut self, mode: u8) -> Result<StartMicrophoneResponse> {
        let request = Request::StartMicrophone(StartMicrophoneRequest {
            timestamp: Timestamp::now(),
            mode,
        });
        let response = self
            .call(&request, ResponseKind::StartMicrophone, self.timeout)
            .await?;
        expect_response!(response, StartMicrophone)
    }

    pub async fn stop_microphone(&mut self) -> Result<()> {
        self.send_request(&Request::StopMicrophone).await
    }

    pub async fn start_scan(&mut self, window: u16, interval: u16) -> Result<StartScanResponse> {
        let request = Request::StartScan(StartScanRequest {
            timestamp: Timestamp::now(),
            window,
            interval,
        });
        let response = self
            .call(&request, ResponseKind::StartScan, self.timeout)
            .await?;
        expect_response!(response, StartScan)
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        self.send_request(&Request::StopScan).await
    }

    pub async fn start_imu(
        &mut self,
        acc_fsr: u16,
        gyr_fsr: u16,
        datarate: u16,
    ) -> Result<StartImuResponse> {
        let request = Request::StartImu(StartImuRequest {
            timestamp: Timestamp::now(),
            acc_fsr,
            gyr_fsr,
            datarate,
        });
        let response = self
            .call(&request, ResponseKind::StartImu, self.timeout)
            .await?;
        expect_response!(response, StartImu)
    }

    pub async fn stop_imu(&mut self) -> Result<()> {
        self.send_request(&Request::StopImu).await
    }

    /// Start one sensor with the configured defaults.
    pub async fn start_sensor(&mut self, sensor: Sensor) -> Result<()> {
        let s = self.config.sensors.clone();
        match sensor {
            Sensor::Microphone => self.start_microphone(s.microphone_mode).await.map(drop),
            Sensor::Scan => self
                .start_scan(s.scan_window, s.scan_interval)
                .await
                .map(drop),
            Sensor::Imu => self
                .start_imu(s.imu_acc_fsr, s.imu_gyr_fsr, s.imu_datarate)
                .await
                .map(drop),
        }
    }

    pub async fn stop_sensor(&mut self, sensor: Sensor) -> Result<()> {
        match sensor {
            Sensor::Microphone => self.stop_microphone().await,
            Sensor::Scan => self.stop_scan().await,
            Sensor::Imu => self.stop_imu().await,
        }
    }

    /// Query status, then start every sensor in `Sensor::ALL` order.
    pub async fn start_all_sensors(&mut self) -> Result<()> {
        self.get_status().await?;
        for sensor in Sensor::ALL {
            self.start_sensor(sensor).await?;
        }
        Ok(())
    }

    pub async fn stop_all_sensors(&mut self) -> Result<()> {
        for sensor in Sensor::ALL {
            self.stop_sensor(sensor).await?;
        }
        Ok(())
    }

    pub async fn get_imu_data(&mut self) -> Result<ImuDataResponse> {
        let response = self
            .call(&Request::GetImuData, ResponseKind::ImuData, self.timeout)
            .await?;
        expect_response!(response, ImuData)
    }

    // ── Device control ───────────────────────────────────────

    /// Blink the badge LED. Durations beyond `u16::MAX` seconds saturate.
    pub async fn identify(&mut self, duration: Duration) -> Result<()> {
        let timeout = u16::try_from(duration.as_secs()).unwrap_or(u16::MAX);
        self.send_request(&Request::Identify { timeout }).await
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.send_request(&Request::Restart).await
    }

    pub async fn get_free_space(&mut self) -> Result<FreeSpaceResponse> {
        let response = self
            .call(&Request::FreeSpace, ResponseKind::FreeSpace, self.timeout)
            .await?;
        expect_response!(response, FreeSpace)
    }

    pub async fn erase_all(&mut self) -> Result<EraseAllResponse> {
        let timeout = self.config.erase_timeout();
        let response = self
            .call(&Request::EraseAll, ResponseKind::EraseAll, timeout)
            .await?;
        expect_response!(response, EraseAll)
    }

    pub async fn get_firmware_version(&mut self) -> Result<String> {
        let response = self
            .call(&Request::GetFwVersion, ResponseKind::FwVersion, self.timeout)
            .await?;
        match response {
            Response::FwVersion { version } => Ok(version.as_str().to_owned()),
            other => Err(Error::UnexpectedResponse {
                expected: ResponseKind::FwVersion,
                got: other.kind(),
            }),
        }
    }

    // ── File transfer primitives ─────────────────────────────

    pub async fn list_files_page(
        &mut self,
        start_index: u8,
        max_files: u8,
    ) -> Result<ListFilesResponse> {
        let request = Request::ListFiles {
            start_index,
            max_files,
        };
        let response = self
            .call(&request, ResponseKind::ListFiles, self.timeout)
            .await?;
        expect_response!(response, ListFiles)
    }

    pub async fn start_download(&mut self, filename: &str) -> Result<StartDownloadResponse> {
        let request = Request::StartDownload {
            filename: fixed(filename)?,
        };
        let response = self
            .call(&request, ResponseKind::StartDownload, self.timeout)
            .await?;
        expect_response!(response, StartDownload)
    }

    pub async fn download_chunk(&mut self, chunk_index: u32) -> Result<DownloadChunkResponse> {
        let request = Request::DownloadChunk { chunk_index };
        let response = self
            .call(&request, ResponseKind::DownloadChunk, self.timeout)
            .await?;
        expect_response!(response, DownloadChunk)
    }

    pub async fn get_file_checksum(&mut self, filename: &str) -> Result<FileChecksumResponse> {
        let request = Request::GetFileChecksum {
            filename: fixed(filename)?,
        };
        let response = self
            .call(&request, ResponseKind::FileChecksum, self.timeout)
            .await?;
        expect_response!(response, FileChecksum)
    }
}
