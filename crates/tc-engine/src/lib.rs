//! Tone synthesis for the treadmill chirp protocol.
//!
//! Renders an encoded frame as on-off keyed bursts of a fixed tone, wrapped
//! in the guard silences the console listens for.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod sample_block;
mod synth;
mod tone;

pub use sample_block::SampleBlock;
pub use synth::{
    burst_ranges, envelope_len, render_burst, synthesize, synthesize_setpoint, CYCLES_PER_SYMBOL,
    ENVELOPE_CYCLES, GAP_SILENCE_CYCLES, LEAD_SILENCE_CYCLES, TAIL_SILENCE_CYCLES,
};
pub use tone::{ParamError, ToneParams};
