//! Container formats for rendered chirps.
//!
//! Only single-channel 16-bit PCM WAV is supported: enough to hand a
//! self-describing stream to a backend or to save a chirp to disk.

mod wav_format;

pub use wav_format::{block_to_wav, load_wav, write_wav, WAV_HEADER_LEN};

/// Error type for format parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid WAV header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Anything other than mono 16-bit integer PCM
    #[error("unsupported WAV layout: format {format}, {channels} channel(s), {bits} bits")]
    Unsupported { format: u16, channels: u16, bits: u16 },
    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
