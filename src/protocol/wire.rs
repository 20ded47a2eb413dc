//! Sequential little-endian field reader and writer.
//!
//! Every message field is read in exactly the order it was written; no
//! decoder indexes fixed byte offsets.

use crate::error::WireError;

/// Cursor over an encoded message.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, WireError> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read a fixed-width string field.
    ///
    /// The value ends at the first NUL; surrounding whitespace is dropped.
    pub fn fixed_str<const N: usize>(&mut self) -> Result<heapless::String<N>, WireError> {
        let raw = self.take(N)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = core::str::from_utf8(&raw[..end]).map_err(|_| WireError::InvalidUtf8)?;
        let mut out = heapless::String::new();
        // The trimmed text is never longer than the field it came from.
        let _ = out.push_str(text.trim());
        Ok(out)
    }
}

/// Growable output buffer for one encoded message.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new(tag: u8) -> Self {
        let mut w = Self::default();
        w.u8(tag);
        w
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// Write a string zero-padded to `N` bytes.
    pub fn fixed_str<const N: usize>(&mut self, v: &heapless::String<N>) -> &mut Self {
        let mut field = [0u8; N];
        field[..v.len()].copy_from_slice(v.as_bytes());
        self.bytes(&field)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Copy `s` into a fixed-width string, rejecting values that do not fit.
pub fn fixed<const N: usize>(s: &str) -> Result<heapless::String<N>, WireError> {
    heapless::String::try_from(s).map_err(|()| WireError::StringTooLong {
        max: N,
        len: s.len(),
    })
}
