//! Carrier tone parameters.

/// Error type for invalid tone parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("tone frequency must be non-zero")]
    ZeroFrequency,
    /// Fewer than two samples per cycle cannot carry a tone
    #[error("{frequency} Hz needs at least two samples per cycle at {sample_rate} Hz")]
    AboveNyquist { sample_rate: u32, frequency: u32 },
}

/// Sample rate, carrier frequency and peak amplitude of a chirp.
///
/// Amplitudes above `i16::MAX` are accepted; rendered samples saturate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ToneParams {
    sample_rate: u32,
    frequency: u32,
    amplitude: u32,
}

impl ToneParams {
    /// 2 kHz at full scale, 44.1 kHz output.
    pub const REFERENCE: ToneParams = ToneParams {
        sample_rate: 44_100,
        frequency: 2_000,
        amplitude: 32_767,
    };

    pub fn new(sample_rate: u32, frequency: u32, amplitude: u32) -> Result<Self, ParamError> {
        if sample_rate == 0 {
            return Err(ParamError::ZeroSampleRate);
        }
        if frequency == 0 {
            return Err(ParamError::ZeroFrequency);
        }
        let params = Self { sample_rate, frequency, amplitude };
        if params.samples_per_cycle() < 2 {
            return Err(ParamError::AboveNyquist { sample_rate, frequency });
        }
        Ok(params)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn amplitude(&self) -> u32 {
        self.amplitude
    }

    /// Same tone at a different amplitude.
    pub fn with_amplitude(self, amplitude: u32) -> Self {
        Self { amplitude, ..self }
    }

    /// Same tone rendered at another output rate. `R` follows the new rate.
    pub fn with_sample_rate(self, sample_rate: u32) -> Result<Self, ParamError> {
        Self::new(sample_rate, self.frequency, self.amplitude)
    }

    /// `round(sample_rate / frequency)`, the integer cycle length `R`.
    pub fn samples_per_cycle(&self) -> usize {
        let rate = self.sample_rate as u64;
        let freq = self.frequency as u64;
        ((2 * rate + freq) / (2 * freq)) as usize
    }
}

impl Default for ToneParams {
    fn default() -> Self {
        Self::REFERENCE
    }
}
