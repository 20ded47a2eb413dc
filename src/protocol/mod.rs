//! Badge wire protocol: message catalog, framing and file checksums.

pub mod checksum;
pub mod codec;
pub mod messages;
pub mod wire;

pub use checksum::{Crc32, checksum_file, crc32};
pub use codec::{FrameDecoder, MAX_FRAME_SIZE, encode_frame};
pub use messages::{
    Axes, BadgeAssignment, DownloadChunkResponse, EraseAllResponse, FileChecksumResponse,
    FileEntry, FileName, FreeSpaceResponse, ImuDataResponse, ListFilesResponse, Request,
    Response, ResponseKind, StartDownloadResponse, StartImuRequest, StartImuResponse,
    StartMicrophoneRequest, StartMicrophoneResponse, StartScanRequest, StartScanResponse,
    StatusRequest, StatusResponse, Timestamp,
};
pub use wire::fixed;
