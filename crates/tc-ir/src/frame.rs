//! 32-symbol wire frame.
//!
//! ```text
//! index  0 1 2 | 3..10 | 11 12 | 13..20  | 21 22 | 23..30   | 31
//! value  0 0 1 | speed |  0  1 | incline |  0  1 | checksum |  0
//! ```
//!
//! Each byte field is written LSB first. The checksum is the wrapping sum
//! of speed and incline.

use core::fmt;

/// Number of symbols in a frame.
pub const FRAME_LEN: usize = 32;

/// Fixed framing symbols as `(index, value)` pairs.
pub const FRAMING_BITS: [(usize, u8); 8] = [
    (0, 0),
    (1, 0),
    (2, 1),
    (11, 0),
    (12, 1),
    (21, 0),
    (22, 1),
    (31, 0),
];

const SPEED_OFFSET: usize = 3;
const INCLINE_OFFSET: usize = 13;
const CHECKSUM_OFFSET: usize = 23;

/// Error type for frames built from raw symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A symbol other than 0 or 1
    #[error("symbol {index} is {value}, expected 0 or 1")]
    NonBinarySymbol { index: usize, value: u8 },
}

/// An encoded command. Every symbol is 0 or 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    symbols: [u8; FRAME_LEN],
}

/// Encode a speed/incline pair. Total over all byte pairs.
pub fn encode(speed: u8, incline: u8) -> Frame {
    let checksum = speed.wrapping_add(incline);
    let mut symbols = [0u8; FRAME_LEN];

    for &(index, value) in FRAMING_BITS.iter() {
        symbols[index] = value;
    }
    load_bits(&mut symbols, SPEED_OFFSET, speed);
    load_bits(&mut symbols, INCLINE_OFFSET, incline);
    load_bits(&mut symbols, CHECKSUM_OFFSET, checksum);

    Frame { symbols }
}

fn load_bits(symbols: &mut [u8; FRAME_LEN], offset: usize, byte: u8) {
    for i in 0..8 {
        symbols[offset + i] = (byte >> i) & 1;
    }
}

fn read_bits(symbols: &[u8; FRAME_LEN], offset: usize) -> u8 {
    (0..8).fold(0u8, |acc, i| acc | (symbols[offset + i] << i))
}

impl Frame {
    /// Build a frame from raw symbols, e.g. recovered from audio.
    ///
    /// Only checks that every symbol is binary; framing and checksum are
    /// left to [`Frame::has_valid_framing`] and [`Frame::has_valid_checksum`].
    pub fn from_symbols(symbols: [u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if let Some((index, &value)) = symbols.iter().enumerate().find(|&(_, &s)| s > 1) {
            return Err(FrameError::NonBinarySymbol { index, value });
        }
        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[u8; FRAME_LEN] {
        &self.symbols
    }

    pub fn speed(&self) -> u8 {
        read_bits(&self.symbols, SPEED_OFFSET)
    }

    pub fn incline(&self) -> u8 {
        read_bits(&self.symbols, INCLINE_OFFSET)
    }

    pub fn checksum(&self) -> u8 {
        read_bits(&self.symbols, CHECKSUM_OFFSET)
    }

    pub fn has_valid_framing(&self) -> bool {
        FRAMING_BITS
            .iter()
            .all(|&(index, value)| self.symbols[index] == value)
    }

    pub fn has_valid_checksum(&self) -> bool {
        self.speed().wrapping_add(self.incline()) == self.checksum()
    }

    /// Number of tone-carrying (1) symbols.
    pub fn ones(&self) -> usize {
        self.symbols.iter().filter(|&&s| s == 1).count()
    }
}

impl fmt::Display for Frame {
    /// Bits grouped by field: `001 speed 01 incline 01 checksum 0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.symbols.iter().enumerate() {
            if matches!(i, 3 | 11 | 13 | 21 | 23 | 31) {
                f.write_str(" ")?;
            }
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}
