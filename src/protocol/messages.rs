//! Request/response message catalog and its binary layout.
//!
//! Every message is a discriminant byte followed by the fields of the
//! selected variant, little-endian, in declaration order. Decoders ignore
//! bytes left over after the last field because the badge pads responses
//! to the size of its largest variant.

use std::time::{SystemTime, UNIX_EPOCH};

use super::wire::{Reader, Writer};
use crate::error::WireError;

/// Width of a filename field on the wire.
pub const FILENAME_LEN: usize = 32;
/// Width of the firmware version string.
pub const VERSION_LEN: usize = 32;
/// Width of the checksum error message.
pub const ERROR_MESSAGE_LEN: usize = 32;
/// File entry slots carried by every listing page.
pub const FILES_PER_PAGE: usize = 3;
/// Encoded size of one listing slot.
pub const FILE_ENTRY_LEN: usize = FILENAME_LEN + 8;
/// Largest payload a single download chunk can carry.
pub const MAX_CHUNK_SIZE: usize = 256;
/// Fixed-point scale of transmitted IMU samples.
pub const IMU_SCALE: f32 = 10_000.0;

pub type FileName = heapless::String<FILENAME_LEN>;

/// Discriminant bytes.
pub mod tag {
    pub mod request {
        pub const STATUS: u8 = 1;
        pub const START_MICROPHONE: u8 = 2;
        pub const STOP_MICROPHONE: u8 = 3;
        pub const START_SCAN: u8 = 4;
        pub const STOP_SCAN: u8 = 5;
        pub const START_IMU: u8 = 6;
        pub const STOP_IMU: u8 = 7;
        pub const IDENTIFY: u8 = 27;
        pub const RESTART: u8 = 29;
        pub const FREE_SPACE: u8 = 30;
        pub const ERASE_ALL: u8 = 31;
        pub const GET_IMU_DATA: u8 = 33;
        pub const GET_FW_VERSION: u8 = 35;
        pub const LIST_FILES: u8 = 37;
        pub const START_DOWNLOAD: u8 = 39;
        pub const DOWNLOAD_CHUNK: u8 = 41;
        pub const GET_FILE_CHECKSUM: u8 = 43;
    }

    pub mod response {
        pub const STATUS: u8 = 1;
        pub const START_MICROPHONE: u8 = 2;
        pub const START_SCAN: u8 = 3;
        pub const START_IMU: u8 = 4;
        pub const FREE_SPACE: u8 = 5;
        pub const ERASE_ALL: u8 = 32;
        pub const IMU_DATA: u8 = 34;
        pub const FW_VERSION: u8 = 36;
        pub const LIST_FILES: u8 = 38;
        pub const START_DOWNLOAD: u8 = 40;
        pub const DOWNLOAD_CHUNK: u8 = 42;
        pub const FILE_CHECKSUM: u8 = 44;
    }
}

// ── Shared field types ────────────────────────────────────────

/// Seconds since the epoch plus a millisecond remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub ms: u16,
}

impl Timestamp {
    pub fn new(seconds: u32, ms: u16) -> Self {
        Self { seconds, ms }
    }

    /// Host wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Times before the epoch clamp to zero.
    pub fn from_system_time(t: SystemTime) -> Self {
        let since = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            seconds: since.as_secs() as u32,
            ms: since.subsec_millis() as u16,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.ms) / 1000.0
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            seconds: r.u32()?,
            ms: r.u16()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.u32(self.seconds).u16(self.ms);
    }
}

/// Identity pushed to a badge inside a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeAssignment {
    pub id: u16,
    pub group: u8,
}

/// Three-axis sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axes {
    /// Build from raw fixed-point samples as transmitted.
    pub fn from_raw(raw: [i16; 3]) -> Self {
        let [x, y, z] = raw.map(|v| f32::from(v) / IMU_SCALE);
        Self { x, y, z }
    }

    pub fn to_raw(&self) -> [i16; 3] {
        [self.x, self.y, self.z].map(|v| (v * IMU_SCALE).round() as i16)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self::from_raw([r.i16()?, r.i16()?, r.i16()?]))
    }

    fn write(&self, w: &mut Writer) {
        for v in self.to_raw() {
            w.i16(v);
        }
    }
}

// ── Requests ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub timestamp: Timestamp,
    pub assignment: Option<BadgeAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartMicrophoneRequest {
    pub timestamp: Timestamp,
    /// 0 = stereo, 1 = mono.
    pub mode: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartScanRequest {
    pub timestamp: Timestamp,
    pub window: u16,
    pub interval: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartImuRequest {
    pub timestamp: Timestamp,
    pub acc_fsr: u16,
    pub gyr_fsr: u16,
    pub datarate: u16,
}

/// Host → badge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status(StatusRequest),
    StartMicrophone(StartMicrophoneRequest),
    StopMicrophone,
    StartScan(StartScanRequest),
    StopScan,
    StartImu(StartImuRequest),
    StopImu,
    /// Blink the badge LED for `timeout` seconds.
    Identify { timeout: u16 },
    Restart,
    FreeSpace,
    EraseAll,
    GetImuData,
    GetFwVersion,
    ListFiles { start_index: u8, max_files: u8 },
    StartDownload { filename: FileName },
    DownloadChunk { chunk_index: u32 },
    GetFileChecksum { filename: FileName },
}

impl Request {
    pub fn tag(&self) -> u8 {
        use tag::request as t;
        match self {
            Self::Status(_) => t::STATUS,
            Self::StartMicrophone(_) => t::START_MICROPHONE,
            Self::StopMicrophone => t::STOP_MICROPHONE,
            Self::StartScan(_) => t::START_SCAN,
            Self::StopScan => t::STOP_SCAN,
            Self::StartImu(_) => t::START_IMU,
            Self::StopImu => t::STOP_IMU,
            Self::Identify { .. } => t::IDENTIFY,
            Self::Restart => t::RESTART,
            Self::FreeSpace => t::FREE_SPACE,
            Self::EraseAll => t::ERASE_ALL,
            Self::GetImuData => t::GET_IMU_DATA,
            Self::GetFwVersion => t::GET_FW_VERSION,
            Self::ListFiles { .. } => t::LIST_FILES,
            Self::StartDownload { .. } => t::START_DOWNLOAD,
            Self::DownloadChunk { .. } => t::DOWNLOAD_CHUNK,
            Self::GetFileChecksum { .. } => t::GET_FILE_CHECKSUM,
        }
    }

    /// Response kind the badge answers with, `None` for fire-and-forget requests.
    pub fn expected_response(&self) -> Option<ResponseKind> {
        let kind = match self {
            Self::Status(_) => ResponseKind::Status,
            Self::StartMicrophone(_) => ResponseKind::StartMicrophone,
            Self::StartScan(_) => ResponseKind::StartScan,
            Self::StartImu(_) => ResponseKind::StartImu,
            Self::FreeSpace => ResponseKind::FreeSpace,
            Self::EraseAll => ResponseKind::EraseAll,
            Self::GetImuData => ResponseKind::ImuData,
            Self::GetFwVersion => ResponseKind::FwVersion,
            Self::ListFiles { .. } => ResponseKind::ListFiles,
            Self::StartDownload { .. } => ResponseKind::StartDownload,
            Self::DownloadChunk { .. } => ResponseKind::DownloadChunk,
            Self::GetFileChecksum { .. } => ResponseKind::FileChecksum,
            Self::StopMicrophone
            | Self::StopScan
            | Self::StopImu
            | Self::Identify { .. }
            | Self::Restart => return None,
        };
        Some(kind)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.tag());
        match self {
            Self::Status(req) => {
                req.timestamp.write(&mut w);
                match req.assignment {
                    Some(a) => {
                        w.u8(1).u16(a.id).u8(a.group);
                    }
                    None => {
                        w.u8(0);
                    }
                }
            }
            Self::StartMicrophone(req) => {
                req.timestamp.write(&mut w);
                w.u8(req.mode);
            }
            Self::StartScan(req) => {
                req.timestamp.write(&mut w);
                w.u16(req.window).u16(req.interval);
            }
            Self::StartImu(req) => {
                req.timestamp.write(&mut w);
                w.u16(req.acc_fsr).u16(req.gyr_fsr).u16(req.datarate);
            }
            Self::Identify { timeout } => {
                w.u16(*timeout);
            }
            Self::ListFiles {
                start_index,
                max_files,
            } => {
                w.u8(*start_index).u8(*max_files);
            }
            Self::StartDownload { filename } | Self::GetFileChecksum { filename } => {
                w.fixed_str(filename);
            }
            Self::DownloadChunk { chunk_index } => {
                w.u32(*chunk_index);
            }
            Self::StopMicrophone
            | Self::StopScan
            | Self::StopImu
            | Self::Restart
            | Self::FreeSpace
            | Self::EraseAll
            | Self::GetImuData
            | Self::GetFwVersion => {}
        }
        w.finish()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        use tag::request as t;
        let mut r = Reader::new(buf);
        let req = match r.u8()? {
            t::STATUS => {
                let timestamp = Timestamp::read(&mut r)?;
                let assignment = if r.bool()? {
                    Some(BadgeAssignment {
                        id: r.u16()?,
                        group: r.u8()?,
                    })
                } else {
                    None
                };
                Self::Status(StatusRequest {
                    timestamp,
                    assignment,
                })
            }
            t::START_MICROPHONE => Self::StartMicrophone(StartMicrophoneRequest {
                timestamp: Timestamp::read(&mut r)?,
                mode: r.u8()?,
            }),
            t::STOP_MICROPHONE => Self::StopMicrophone,
            t::START_SCAN => Self::StartScan(StartScanRequest {
                timestamp: Timestamp::read(&mut r)?,
                window: r.u16()?,
                interval: r.u16()?,
            }),
            t::STOP_SCAN => Self::StopScan,
            t::START_IMU => Self::StartImu(StartImuRequest {
                timestamp: Timestamp::read(&mut r)?,
                acc_fsr: r.u16()?,
                gyr_fsr: r.u16()?,
                datarate: r.u16()?,
            }),
            t::STOP_IMU => Self::StopImu,
            t::IDENTIFY => Self::Identify { timeout: r.u16()? },
            t::RESTART => Self::Restart,
            t::FREE_SPACE => Self::FreeSpace,
            t::ERASE_ALL => Self::EraseAll,
            t::GET_IMU_DATA => Self::GetImuData,
            t::GET_FW_VERSION => Self::GetFwVersion,
            t::LIST_FILES => Self::ListFiles {
                start_index: r.u8()?,
                max_files: r.u8()?,
            },
            t::START_DOWNLOAD => Self::StartDownload {
                filename: r.fixed_str()?,
            },
            t::DOWNLOAD_CHUNK => Self::DownloadChunk {
                chunk_index: r.u32()?,
            },
            t::GET_FILE_CHECKSUM => Self::GetFileChecksum {
                filename: r.fixed_str()?,
            },
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(req)
    }
}

// ── Responses ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub clock: bool,
    pub microphone: bool,
    pub scan: bool,
    pub imu: bool,
    /// Battery level, 0-100.
    pub battery: u8,
    pub pdm_data: i16,
    pub scan_data: i8,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartMicrophoneResponse {
    pub timestamp: Timestamp,
    pub mode: u8,
    pub gain_l: i8,
    pub gain_r: i8,
    pub switch_pos: i8,
    pub pdm_freq: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartScanResponse {
    pub timestamp: Timestamp,
    pub window: u16,
    pub interval: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartImuResponse {
    pub timestamp: Timestamp,
    pub self_test_done: bool,
    pub gyr_fsr: u32,
    pub acc_fsr: u32,
    pub datarate: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpaceResponse {
    pub total_space: u32,
    pub free_space: u32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraseAllResponse {
    pub done: bool,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuDataResponse {
    pub gyr: Axes,
    pub mag: Axes,
    pub acc: Axes,
    pub rot: Axes,
    pub timestamp: Timestamp,
}

/// One file stored on the badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: FileName,
    pub size: u32,
    pub timestamp: u32,
}

impl FileEntry {
    fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            filename: r.fixed_str()?,
            size: r.u32()?,
            timestamp: r.u32()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.fixed_str(&self.filename).u32(self.size).u32(self.timestamp);
    }
}

/// One page of the badge's file listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilesResponse {
    pub total_files: u8,
    pub start_index: u8,
    pub file_count: u8,
    /// Non-empty entries of the page.
    pub files: heapless::Vec<FileEntry, FILES_PER_PAGE>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartDownloadResponse {
    pub success: bool,
    pub file_size: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadChunkResponse {
    pub data: heapless::Vec<u8, MAX_CHUNK_SIZE>,
    pub is_last_chunk: bool,
}

impl DownloadChunkResponse {
    pub fn chunk_size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChecksumResponse {
    pub success: bool,
    pub checksum: u32,
    pub error_message: heapless::String<ERROR_MESSAGE_LEN>,
}

/// Response discriminants, also used as mailbox indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Status,
    StartMicrophone,
    StartScan,
    StartImu,
    FreeSpace,
    EraseAll,
    ImuData,
    FwVersion,
    ListFiles,
    StartDownload,
    DownloadChunk,
    FileChecksum,
}

impl ResponseKind {
    pub const COUNT: usize = 12;

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn tag(self) -> u8 {
        use tag::response as t;
        match self {
            Self::Status => t::STATUS,
            Self::StartMicrophone => t::START_MICROPHONE,
            Self::StartScan => t::START_SCAN,
            Self::StartImu => t::START_IMU,
            Self::FreeSpace => t::FREE_SPACE,
            Self::EraseAll => t::ERASE_ALL,
            Self::ImuData => t::IMU_DATA,
            Self::FwVersion => t::FW_VERSION,
            Self::ListFiles => t::LIST_FILES,
            Self::StartDownload => t::START_DOWNLOAD,
            Self::DownloadChunk => t::DOWNLOAD_CHUNK,
            Self::FileChecksum => t::FILE_CHECKSUM,
        }
    }
}

/// Badge → host message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Status(StatusResponse),
    StartMicrophone(StartMicrophoneResponse),
    StartScan(StartScanResponse),
    StartImu(StartImuResponse),
    FreeSpace(FreeSpaceResponse),
    EraseAll(EraseAllResponse),
    ImuData(ImuDataResponse),
    FwVersion {
        version: heapless::String<VERSION_LEN>,
    },
    ListFiles(ListFilesResponse),
    StartDownload(StartDownloadResponse),
    DownloadChunk(DownloadChunkResponse),
    FileChecksum(FileChecksumResponse),
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Self::Status(_) => ResponseKind::Status,
            Self::StartMicrophone(_) => ResponseKind::StartMicrophone,
            Self::StartScan(_) => ResponseKind::StartScan,
            Self::StartImu(_) => ResponseKind::StartImu,
            Self::FreeSpace(_) => ResponseKind::FreeSpace,
            Self::EraseAll(_) => ResponseKind::EraseAll,
            Self::ImuData(_) => ResponseKind::ImuData,
            Self::FwVersion { .. } => ResponseKind::FwVersion,
            Self::ListFiles(_) => ResponseKind::ListFiles,
            Self::StartDownload(_) => ResponseKind::StartDownload,
            Self::DownloadChunk(_) => ResponseKind::DownloadChunk,
            Self::FileChecksum(_) => ResponseKind::FileChecksum,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.kind().tag());
        match self {
            Self::Status(s) => {
                w.bool(s.clock)
                    .bool(s.microphone)
                    .bool(s.scan)
                    .bool(s.imu)
                    .u8(s.battery)
                    .i16(s.pdm_data)
                    .i8(s.scan_data);
                s.timestamp.write(&mut w);
            }
            Self::StartMicrophone(s) => {
                s.timestamp.write(&mut w);
                w.u8(s.mode)
                    .i8(s.gain_l)
                    .i8(s.gain_r)
                    .i8(s.switch_pos)
                    .u16(s.pdm_freq);
            }
            Self::StartScan(s) => {
                s.timestamp.write(&mut w);
                w.u16(s.window).u16(s.interval);
            }
            Self::StartImu(s) => {
                s.timestamp.write(&mut w);
                w.bool(s.self_test_done)
                    .u32(s.gyr_fsr)
                    .u32(s.acc_fsr)
                    .u8(s.datarate);
            }
            Self::FreeSpace(s) => {
                w.u32(s.total_space).u32(s.free_space);
                s.timestamp.write(&mut w);
            }
            Self::EraseAll(s) => {
                w.bool(s.done);
                s.timestamp.write(&mut w);
            }
            Self::ImuData(s) => {
                for axes in [&s.gyr, &s.mag, &s.acc, &s.rot] {
                    axes.write(&mut w);
                }
                s.timestamp.write(&mut w);
            }
            Self::FwVersion { version } => {
                w.fixed_str(version);
            }
            Self::ListFiles(s) => {
                w.u8(s.total_files).u8(s.start_index).u8(s.file_count);
                for entry in &s.files {
                    entry.write(&mut w);
                }
                let padding = FILES_PER_PAGE - s.files.len();
                w.bytes(&vec![0u8; padding * FILE_ENTRY_LEN]);
            }
            Self::StartDownload(s) => {
                w.bool(s.success).u32(s.file_size).u32(s.total_chunks);
            }
            Self::DownloadChunk(s) => {
                w.u16(s.data.len() as u16).bytes(&s.data).bool(s.is_last_chunk);
            }
            Self::FileChecksum(s) => {
                w.bool(s.success).u32(s.checksum).fixed_str(&s.error_message);
            }
        }
        w.finish()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        use tag::response as t;
        let mut r = Reader::new(buf);
        let resp = match r.u8()? {
            t::STATUS => Self::Status(StatusResponse {
                clock: r.bool()?,
                microphone: r.bool()?,
                scan: r.bool()?,
                imu: r.bool()?,
                battery: r.u8()?,
                pdm_data: r.i16()?,
                scan_data: r.i8()?,
                timestamp: Timestamp::read(&mut r)?,
            }),
            t::START_MICROPHONE => Self::StartMicrophone(StartMicrophoneResponse {
                timestamp: Timestamp::read(&mut r)?,
                mode: r.u8()?,
                gain_l: r.i8()?,
                gain_r: r.i8()?,
                switch_pos: r.i8()?,
                pdm_freq: r.u16()?,
            }),
            t::START_SCAN => Self::StartScan(StartScanResponse {
                timestamp: Timestamp::read(&mut r)?,
                window: r.u16()?,
                interval: r.u16()?,
            }),
            t::START_IMU => Self::StartImu(StartImuResponse {
                timestamp: Timestamp::read(&mut r)?,
                self_test_done: r.bool()?,
                gyr_fsr: r.u32()?,
                acc_fsr: r.u32()?,
                datarate: r.u8()?,
            }),
            t::FREE_SPACE => Self::FreeSpace(FreeSpaceResponse {
                total_space: r.u32()?,
                free_space: r.u32()?,
                timestamp: Timestamp::read(&mut r)?,
            }),
            t::ERASE_ALL => Self::EraseAll(EraseAllResponse {
                done: r.bool()?,
                timestamp: Timestamp::read(&mut r)?,
            }),
            t::IMU_DATA => Self::ImuData(ImuDataResponse {
                gyr: Axes::read(&mut r)?,
                mag: Axes::read(&mut r)?,
                acc: Axes::read(&mut r)?,
                rot: Axes::read(&mut r)?,
                timestamp: Timestamp::read(&mut r)?,
            }),
            t::FW_VERSION => Self::FwVersion {
                version: r.fixed_str()?,
            },
            t::LIST_FILES => {
                let total_files = r.u8()?;
                let start_index = r.u8()?;
                let file_count = r.u8()?;
                if usize::from(file_count) > FILES_PER_PAGE {
                    return Err(WireError::TooManyEntries(file_count.into()));
                }
                let mut files = heapless::Vec::new();
                for _ in 0..FILES_PER_PAGE {
                    let entry = FileEntry::read(&mut r)?;
                    if !entry.filename.is_empty() {
                        // At most FILES_PER_PAGE iterations.
                        let _ = files.push(entry);
                    }
                }
                Self::ListFiles(ListFilesResponse {
                    total_files,
                    start_index,
                    file_count,
                    files,
                })
            }
            t::START_DOWNLOAD => Self::StartDownload(StartDownloadResponse {
                success: r.bool()?,
                file_size: r.u32()?,
                total_chunks: r.u32()?,
            }),
            t::DOWNLOAD_CHUNK => {
                let size = usize::from(r.u16()?);
                if size > MAX_CHUNK_SIZE {
                    return Err(WireError::ChunkTooLarge(size));
                }
                let data = heapless::Vec::from_slice(r.take(size)?)
                    .map_err(|()| WireError::ChunkTooLarge(size))?;
                Self::DownloadChunk(DownloadChunkResponse {
                    data,
                    is_last_chunk: r.bool()?,
                })
            }
            t::FILE_CHECKSUM => Self::FileChecksum(FileChecksumResponse {
                success: r.bool()?,
                checksum: r.u32()?,
                error_message: r.fixed_str()?,
            }),
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(resp)
    }
}
