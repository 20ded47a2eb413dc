//! CRC-32 as computed by the badge over stored files.
//!
//! Reflected polynomial `0xEDB88320`, register preset to `0xFFFFFFFF`,
//! one bit per iteration, result complemented.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

/// Reflected CRC-32 polynomial.
pub const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_INIT: u32 = 0xFFFF_FFFF;

/// Incremental CRC-32.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Self { value: CRC32_INIT }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.value ^= u32::from(byte);
            for _ in 0..8 {
                self.value = if self.value & 1 != 0 {
                    (self.value >> 1) ^ CRC32_POLY
                } else {
                    self.value >> 1
                };
            }
        }
    }

    pub fn finalize(&self) -> u32 {
        !self.value
    }

    pub fn reset(&mut self) {
        self.value = CRC32_INIT;
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot CRC-32 of a buffer.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// CRC-32 of a local file, streamed.
pub fn checksum_file(path: &Path) -> Result<u32> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut crc = Crc32::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        crc.update(&buf[..n]);
    }
    Ok(crc.finalize())
}
