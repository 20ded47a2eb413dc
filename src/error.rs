//! Unified error types for the badge hub.
//!
//! A single `Error` enum that every layer funnels into, so session,
//! download and fleet callers all match on the same variants. Wire-level
//! failures are kept in their own `Copy` enum and wrapped as
//! `Error::MalformedMessage`.

use core::fmt;
use core::time::Duration;

use crate::protocol::ResponseKind;

// ---------------------------------------------------------------------------
// Wire errors
// ---------------------------------------------------------------------------

/// Failure to encode or decode a message or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes remain than the field being read requires.
    Truncated { needed: usize, remaining: usize },
    /// The discriminant byte does not name any catalog variant.
    UnknownTag(u8),
    /// A string does not fit its fixed-width field.
    StringTooLong { max: usize, len: usize },
    /// A fixed-width string field is not valid UTF-8.
    InvalidUtf8,
    /// A file listing page carries more entries than a page can hold.
    TooManyEntries(usize),
    /// A download chunk announces more bytes than a chunk can hold.
    ChunkTooLarge(usize),
    /// A frame payload is empty or exceeds the maximum frame size.
    FrameSize(usize),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, remaining } => {
                write!(f, "truncated: need {needed} bytes, {remaining} remain")
            }
            Self::UnknownTag(tag) => write!(f, "unknown discriminant {tag}"),
            Self::StringTooLong { max, len } => {
                write!(f, "string of {len} bytes exceeds field width {max}")
            }
            Self::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            Self::TooManyEntries(n) => write!(f, "{n} file entries exceed page capacity"),
            Self::ChunkTooLarge(n) => write!(f, "chunk of {n} bytes exceeds chunk capacity"),
            Self::FrameSize(n) => write!(f, "frame payload of {n} bytes out of range"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A frame or message could not be decoded (or encoded).
    MalformedMessage(WireError),
    /// A response arrived in a mailbox of a different kind.
    UnexpectedResponse {
        expected: ResponseKind,
        got: ResponseKind,
    },
    /// No matching response arrived within the call budget.
    Timeout { kind: ResponseKind, after: Duration },
    /// Every connect attempt failed.
    ConnectFailed { attempts: u32, last: String },
    /// The link dropped or was never established.
    Disconnected,
    /// The transport reported a write or connect error.
    Transport(String),
    /// The badge refused to start a download.
    DownloadRejected { filename: String },
    /// The badge returned a zero-length chunk.
    EmptyChunk { index: u32 },
    /// Assembled download length differs from the announced size.
    SizeMismatch { expected: u32, actual: usize },
    /// Local and remote checksums differ. The local file is kept.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// The badge could not compute a checksum for the file.
    ChecksumUnavailable(String),
    /// Local filesystem failure.
    Io(String),
    /// An operation failed on one device of a fleet fan-out.
    Device {
        participant_id: u16,
        source: Box<Error>,
    },
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage(e) => write!(f, "malformed message: {e}"),
            Self::UnexpectedResponse { expected, got } => {
                write!(f, "expected {expected:?} response, got {got:?}")
            }
            Self::Timeout { kind, after } => {
                write!(f, "no {kind:?} response within {} ms", after.as_millis())
            }
            Self::ConnectFailed { attempts, last } => {
                write!(f, "connect failed after {attempts} attempts: {last}")
            }
            Self::Disconnected => write!(f, "badge disconnected"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::DownloadRejected { filename } => {
                write!(f, "badge rejected download of {filename}")
            }
            Self::EmptyChunk { index } => write!(f, "received empty chunk {index}"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "downloaded {actual} bytes, expected {expected}")
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: badge {expected:#010x}, local {actual:#010x}")
            }
            Self::ChecksumUnavailable(msg) => write!(f, "checksum unavailable: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Device {
                participant_id,
                source,
            } => write!(f, "participant {participant_id}: {source}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Self::MalformedMessage(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl Error {
    /// Whether retrying the whole connect-and-operate cycle can help.
    ///
    /// A failed connect has already spent its attempt budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectFailed { .. } | Self::Config(_) => false,
            Self::Device { source, .. } => source.is_retryable(),
            _ => true,
        }
    }

    /// Unwrap a fleet `Device` wrapper to the underlying failure.
    pub fn root(&self) -> &Error {
        match self {
            Self::Device { source, .. } => source.root(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
