//! Fuzz target: `FrameDecoder::decode`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at a data-dependent point, and asserts that it never panics, never
//! yields an empty or oversized payload, and consumes every byte offered.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use std::collections::VecDeque;

use badgehub::protocol::{FrameDecoder, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();
    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());

    let mut queue = VecDeque::new();
    for part in [&data[..split], &data[split..]] {
        queue.extend(part.iter().copied());
        while let Some(payload) = decoder.decode(&mut queue) {
            assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
            assert!(!payload.is_empty(), "decoder must not yield empty payload");
        }
        assert!(queue.is_empty(), "decoder must consume all offered bytes");
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    assert!(decoder.is_idle());
    let mut queue: VecDeque<u8> = data.iter().copied().collect();
    while decoder.decode(&mut queue).is_some() {}
});
