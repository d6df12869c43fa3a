//! Sample extraction from data item bodies.
//!
//! Samples are little-endian integers of 8, 16, 24 or 32 bits packed back
//! to back. Each one is zero-extended into an `i32`; callers that want
//! signed values can sign-extend with [`sign_extend`].
//!
//! # Example
//!
//! ```
//! use netsdr_client::samples::get_samples;
//!
//! let samples: Vec<i32> = get_samples(16, &[0x01, 0x00, 0x02, 0x00, 0x03]).unwrap().collect();
//! assert_eq!(samples, vec![1, 2]); // trailing byte dropped
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NetSdrError, Result};

/// Supported sample widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SampleWidth {
    Bits8,
    Bits16,
    Bits24,
    Bits32,
}

impl SampleWidth {
    /// Resolve a width in bits.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(SampleWidth::Bits8),
            16 => Ok(SampleWidth::Bits16),
            24 => Ok(SampleWidth::Bits24),
            32 => Ok(SampleWidth::Bits32),
            other => Err(NetSdrError::UnsupportedSampleWidth(other)),
        }
    }

    #[inline]
    pub fn bits(self) -> u16 {
        match self {
            SampleWidth::Bits8 => 8,
            SampleWidth::Bits16 => 16,
            SampleWidth::Bits24 => 24,
            SampleWidth::Bits32 => 32,
        }
    }

    /// Bytes per sample.
    #[inline]
    pub fn stride(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

impl TryFrom<u16> for SampleWidth {
    type Error = NetSdrError;

    fn try_from(bits: u16) -> Result<Self> {
        Self::from_bits(bits)
    }
}

impl From<SampleWidth> for u16 {
    fn from(width: SampleWidth) -> u16 {
        width.bits()
    }
}

/// Lazy iterator over the samples in a body.
///
/// Cloning restarts from the clone point without touching the original.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl<'a> Samples<'a> {
    /// Iterate `body` at a given width. Trailing bytes short of a full
    /// sample are ignored.
    pub fn new(width: SampleWidth, body: &'a [u8]) -> Self {
        Self {
            chunks: body.chunks_exact(width.stride()),
        }
    }
}

impl Iterator for Samples<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        self.chunks.next().map(assemble_le)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Samples<'_> {}

fn assemble_le(chunk: &[u8]) -> i32 {
    let mut word = [0u8; 4];
    word[..chunk.len()].copy_from_slice(chunk);
    i32::from_le_bytes(word)
}

/// Extract samples from a data item body.
///
/// Fails with [`NetSdrError::UnsupportedSampleWidth`] before producing
/// anything when `bit_width` isn't 8, 16, 24 or 32.
pub fn get_samples(bit_width: u16, body: &[u8]) -> Result<Samples<'_>> {
    let width = SampleWidth::from_bits(bit_width)?;
    Ok(Samples::new(width, body))
}

/// Reinterpret a zero-extended sample as a signed value of `width`.
#[inline]
pub fn sign_extend(sample: i32, width: SampleWidth) -> i32 {
    let shift = 32 - u32::from(width.bits());
    (sample << shift) >> shift
}
