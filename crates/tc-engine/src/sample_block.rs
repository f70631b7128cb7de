//! Rendered PCM sample block.

use alloc::vec::Vec;
use core::time::Duration;

/// Mono signed 16-bit PCM at a fixed sample rate.
///
/// Immutable once rendered; playback backends borrow the samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleBlock {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl SampleBlock {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall-clock length of the block when played at its sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u64 * 1_000_000_000 / self.sample_rate as u64;
        Duration::from_nanos(nanos)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}
