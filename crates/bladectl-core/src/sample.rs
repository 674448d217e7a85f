//! Sample formats

use crate::error::{Error, Result};

/// Wire format of sample buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Interleaved little-endian i16 I/Q, 12 significant bits
    #[default]
    Sc16Q12,
}

impl SampleFormat {
    /// Bytes per complex sample
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Sc16Q12 => 4,
        }
    }

    /// Byte length of `count` samples, checked against a buffer of `available` bytes
    pub fn byte_len(&self, count: usize, available: usize) -> Result<usize> {
        let needed = count
            .checked_mul(self.bytes_per_sample())
            .ok_or(Error::BufferTooSmall)?;
        if needed > available {
            return Err(Error::BufferTooSmall);
        }
        Ok(needed)
    }
}

/// Per-transfer stream metadata
///
/// Timestamps and flags require FPGA support that neither backend has;
/// passing metadata to `rx`/`tx` returns `Error::Unsupported`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Sample clock timestamp
    pub timestamp: u64,
    /// Stream flags
    pub flags: u32,
}

/// Encode I/Q pairs into wire bytes. Returns the number of samples written.
pub fn pack_sc16q12(iq: &[i16], out: &mut [u8]) -> usize {
    let samples = (iq.len() / 2).min(out.len() / 4);
    for (value, dst) in iq[..samples * 2].iter().zip(out.chunks_exact_mut(2)) {
        dst.copy_from_slice(&value.to_le_bytes());
    }
    samples
}

/// Decode wire bytes into I/Q pairs. Returns the number of samples read.
pub fn unpack_sc16q12(bytes: &[u8], iq: &mut [i16]) -> usize {
    let samples = (bytes.len() / 4).min(iq.len() / 2);
    for (src, value) in bytes[..samples * 4].chunks_exact(2).zip(iq.iter_mut()) {
        *value = i16::from_le_bytes([src[0], src[1]]);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_len() {
        let fmt = SampleFormat::Sc16Q12;
        assert_eq!(fmt.byte_len(10, 40), Ok(40));
        assert_eq!(fmt.byte_len(10, 39), Err(Error::BufferTooSmall));
        assert_eq!(fmt.byte_len(usize::MAX, usize::MAX), Err(Error::BufferTooSmall));
    }

    #[test]
    fn test_pack_layout() {
        let iq = [0x07ff, -2048, 1, -1];
        let mut bytes = [0u8; 8];
        assert_eq!(pack_sc16q12(&iq, &mut bytes), 2);
        assert_eq!(bytes, [0xff, 0x07, 0x00, 0xf8, 0x01, 0x00, 0xff, 0xff]);

        let mut back = [0i16; 4];
        assert_eq!(unpack_sc16q12(&bytes, &mut back), 2);
        assert_eq!(back, iq);
    }

    #[test]
    fn test_pack_truncates_to_shorter_buffer() {
        let iq = [1i16; 6];
        let mut bytes = [0u8; 8];
        assert_eq!(pack_sc16q12(&iq, &mut bytes), 2);
    }
}
