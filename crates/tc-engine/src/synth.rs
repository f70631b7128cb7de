//! On-off keyed chirp synthesis.
//!
//! A `1` symbol is four cycles of the carrier, a `0` symbol is silence of
//! the same length. The full transmission, in cycles of the carrier:
//!
//! ```text
//! | 32 silence | 128 burst | 64 silence | 128 burst (same samples) | 32 silence |
//! ```
//!
//! The layout is fixed regardless of payload. The console only listens
//! inside the guard silences, so none of them may be shortened.

use alloc::vec;
use alloc::vec::Vec;
use core::f64::consts::PI;
use core::ops::Range;

use tc_ir::{Frame, Setpoint, FRAME_LEN};

use crate::sample_block::SampleBlock;
use crate::tone::ToneParams;

/// Carrier cycles per frame symbol.
pub const CYCLES_PER_SYMBOL: usize = 4;

/// Leading guard silence, in carrier cycles.
pub const LEAD_SILENCE_CYCLES: usize = 32;

/// Silence between the two bursts, in carrier cycles.
pub const GAP_SILENCE_CYCLES: usize = 64;

/// Trailing guard silence, in carrier cycles.
pub const TAIL_SILENCE_CYCLES: usize = 32;

const BURST_CYCLES: usize = FRAME_LEN * CYCLES_PER_SYMBOL;

/// Length of a whole transmission, in carrier cycles.
pub const ENVELOPE_CYCLES: usize =
    LEAD_SILENCE_CYCLES + BURST_CYCLES + GAP_SILENCE_CYCLES + BURST_CYCLES + TAIL_SILENCE_CYCLES;

/// Number of samples in a transmission: `384 * R`.
pub fn envelope_len(params: &ToneParams) -> usize {
    ENVELOPE_CYCLES * params.samples_per_cycle()
}

/// Sample ranges of the first and second burst inside a transmission.
pub fn burst_ranges(params: &ToneParams) -> [Range<usize>; 2] {
    let r = params.samples_per_cycle();
    let first = LEAD_SILENCE_CYCLES * r;
    let second = first + (BURST_CYCLES + GAP_SILENCE_CYCLES) * r;
    let len = BURST_CYCLES * r;
    [first..first + len, second..second + len]
}

/// Render one symbol's worth of carrier: `4 * R` samples starting at phase 0.
fn tone_symbol(params: &ToneParams) -> Vec<i16> {
    let r = params.samples_per_cycle();
    let amplitude = params.amplitude() as f64;
    (0..CYCLES_PER_SYMBOL * r)
        .map(|j| {
            let value = libm::round(amplitude * libm::sin(2.0 * PI * j as f64 / r as f64));
            value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Render the 32 symbols of a frame back to back (`128 * R` samples).
pub fn render_burst(frame: &Frame, params: &ToneParams) -> Vec<i16> {
    let tone = tone_symbol(params);
    let mut burst = Vec::with_capacity(tone.len() * FRAME_LEN);
    for &symbol in frame.symbols() {
        if symbol == 1 {
            burst.extend_from_slice(&tone);
        } else {
            burst.resize(burst.len() + tone.len(), 0);
        }
    }
    burst
}

/// Render a complete transmission for `frame`.
///
/// The burst is rendered once and copied into both slots, so the two
/// repeats are sample-identical.
pub fn synthesize(frame: &Frame, params: &ToneParams) -> SampleBlock {
    let r = params.samples_per_cycle();
    let burst = render_burst(frame, params);

    let mut samples = vec![0i16; envelope_len(params)];
    for range in burst_ranges(params) {
        samples[range].copy_from_slice(&burst);
    }
    debug_assert_eq!(samples.len(), ENVELOPE_CYCLES * r);

    SampleBlock::new(samples, params.sample_rate())
}

/// Encode and render a setpoint in one step.
pub fn synthesize_setpoint(setpoint: Setpoint, params: &ToneParams) -> SampleBlock {
    synthesize(&setpoint.encode(), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_ir::encode;

    fn symbol_region(block: &SampleBlock, burst_start: usize, r: usize, index: usize) -> &[i16] {
        let len = CYCLES_PER_SYMBOL * r;
        let start = burst_start + index * len;
        &block.samples()[start..start + len]
    }

    #[test]
    fn reference_envelope_length() {
        let block = synthesize(&encode(35, 20), &ToneParams::REFERENCE);
        assert_eq!(block.len(), 8448);
        assert_eq!(block.sample_rate(), 44_100);
    }

    #[test]
    fn length_is_independent_of_payload() {
        let params = ToneParams::new(48_000, 2_000, 20_000).unwrap();
        for (speed, incline) in [(0, 0), (255, 255), (248, 10), (200, 120)] {
            let block = synthesize(&encode(speed, incline), &params);
            assert_eq!(block.len(), 384 * 24);
        }
    }

    #[test]
    fn guard_silences_are_silent() {
        let params = ToneParams::REFERENCE;
        let r = params.samples_per_cycle();
        let block = synthesize(&encode(255, 255), &params);
        let [first, second] = burst_ranges(&params);
        let samples = block.samples();

        assert_eq!(first.start, 32 * r);
        assert!(samples[..first.start].iter().all(|&s| s == 0));
        assert_eq!(second.start - first.end, 64 * r);
        assert!(samples[first.end..second.start].iter().all(|&s| s == 0));
        assert_eq!(samples.len() - second.end, 32 * r);
        assert!(samples[second.end..].iter().all(|&s| s == 0));
    }

    #[test]
    fn symbol_regions_follow_frame() {
        let params = ToneParams::REFERENCE;
        let r = params.samples_per_cycle();
        let frame = encode(35, 20);
        let block = synthesize(&frame, &params);
        let [first, _] = burst_ranges(&params);

        for (i, &symbol) in frame.symbols().iter().enumerate() {
            let region = symbol_region(&block, first.start, r, i);
            let peak = region.iter().map(|s| s.unsigned_abs()).max().unwrap();
            if symbol == 0 {
                assert_eq!(peak, 0, "symbol {} should be silent", i);
            } else {
                // sin peaks between samples when R is not a multiple of 4
                assert!(peak as f64 >= 32_767.0 * 0.98, "symbol {} peak {}", i, peak);
                assert!(peak <= 32_767);
            }
        }
    }

    #[test]
    fn tone_samples_match_formula() {
        let params = ToneParams::REFERENCE;
        let tone = tone_symbol(&params);
        assert_eq!(tone.len(), 88);
        assert_eq!(tone[0], 0);
        let expected = libm::round(32_767.0 * libm::sin(2.0 * PI * 5.0 / 22.0)) as i16;
        assert_eq!(tone[5], expected);
        // four whole cycles: sample j and j + R are equal
        assert_eq!(tone[3], tone[3 + 22]);
    }

    #[test]
    fn exact_quarter_cycle_reaches_amplitude() {
        // R = 24, sample 6 sits on the sine peak
        let params = ToneParams::new(48_000, 2_000, 12_345).unwrap();
        let block = synthesize(&encode(255, 255), &params);
        assert_eq!(block.peak(), 12_345);
    }

    #[test]
    fn bursts_are_identical() {
        let params = ToneParams::REFERENCE;
        let block = synthesize(&encode(123, 45), &params);
        let [first, second] = burst_ranges(&params);
        assert_eq!(&block.samples()[first], &block.samples()[second]);
    }

    #[test]
    fn amplitude_saturates() {
        let params = ToneParams::new(48_000, 2_000, 100_000).unwrap();
        let block = synthesize(&encode(255, 255), &params);
        assert_eq!(block.samples().iter().max(), Some(&i16::MAX));
        assert_eq!(block.samples().iter().min(), Some(&i16::MIN));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let params = ToneParams::REFERENCE;
        let sp = Setpoint::new(60, 30);
        assert_eq!(synthesize_setpoint(sp, &params), synthesize_setpoint(sp, &params));
    }

    #[test]
    fn different_setpoints_render_differently() {
        let params = ToneParams::REFERENCE;
        let a = synthesize(&encode(10, 10), &params);
        let b = synthesize(&encode(20, 20), &params);
        assert_ne!(a, b);
    }
}
