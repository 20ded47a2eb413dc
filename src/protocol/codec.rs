//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (2B)│ Message payload (N B)    │
//! │ LE u16     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The decoder pulls bytes from the session's inbound queue only as far as
//! the current frame needs, so a notification may carry part of a header,
//! part of a payload, or several frames back to back.

use std::collections::VecDeque;

use log::debug;

use crate::error::WireError;

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 1024;

/// Frame header size (2-byte little-endian length).
pub const HEADER_SIZE: usize = 2;

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: heapless::Vec<u8, MAX_FRAME_SIZE>,
    discarded: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: heapless::Vec::new(),
            discarded: 0,
        }
    }

    /// Consume bytes from the front of `src`.
    ///
    /// Returns `Some(payload)` once a whole frame has been read. Bytes past
    /// the end of that frame stay in `src` for the next call.
    pub fn decode(&mut self, src: &mut VecDeque<u8>) -> Option<&[u8]> {
        loop {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    while *collected < HEADER_SIZE {
                        self.header_buf[*collected] = src.pop_front()?;
                        *collected += 1;
                    }

                    let expected = usize::from(u16::from_le_bytes(self.header_buf));
                    if expected == 0 || expected > MAX_FRAME_SIZE {
                        // Invalid frame header, resync on the following bytes.
                        debug!("FRAME: discarding header announcing {} bytes", expected);
                        self.discarded += 1;
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        continue;
                    }

                    self.payload_buf.clear();
                    self.state = DecoderState::ReadingPayload { expected };
                }

                DecoderState::ReadingPayload { expected } => {
                    let expected = *expected;
                    while self.payload_buf.len() < expected {
                        let byte = src.pop_front()?;
                        // expected <= MAX_FRAME_SIZE, so the push cannot fail.
                        let _ = self.payload_buf.push(byte);
                    }
                    self.state = DecoderState::ReadingHeader { collected: 0 };
                    return Some(self.payload_buf.as_slice());
                }
            }
        }
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::ReadingHeader { collected: 0 }
    }

    /// Number of invalid headers skipped since creation.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a message payload into a length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameSize(payload.len()));
    }
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}
