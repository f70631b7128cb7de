//! Device channel trait and error types.

use std::ops::RangeInclusive;
use tc_engine::SampleBlock;

/// Device index that selects the system default output.
pub const DEFAULT_DEVICE_INDEX: i32 = -1;

/// Name reported for the default entry when the host cannot name it.
pub const DEFAULT_DEVICE_NAME: &str = "Default output";

/// Error type for device operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Index outside `-1..count`; nothing was played
    #[error("device index {index} is outside -1..{count}")]
    InvalidIndex { index: i32, count: usize },
    /// The selected device disappeared between enumeration and playback
    #[error("no output device at index {0}")]
    NoDevice(i32),
    /// Playback started but the audio subsystem failed
    #[error("playback failed: {0}")]
    PlaybackFailed(String),
}

/// An output device as seen at enumeration time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: i32,
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(index: i32, name: impl Into<String>) -> Self {
        Self { index, name: name.into() }
    }

    pub fn is_default(&self) -> bool {
        self.index == DEFAULT_DEVICE_INDEX
    }
}

/// Reject indices outside `-1..count` before touching any device.
pub fn check_index(index: i32, count: usize) -> Result<(), DeviceError> {
    if index < DEFAULT_DEVICE_INDEX || index as i64 >= count as i64 {
        return Err(DeviceError::InvalidIndex { index, count });
    }
    Ok(())
}

/// Pick the rate to render at for a device supporting `ranges`.
///
/// `preferred` if some range contains it, else the closest supported rate;
/// ties go to the higher rate. `None` when `ranges` is empty.
pub fn choose_rate(ranges: &[RangeInclusive<u32>], preferred: u32) -> Option<u32> {
    if ranges.iter().any(|r| r.contains(&preferred)) {
        return Some(preferred);
    }
    ranges
        .iter()
        .map(|r| preferred.clamp(*r.start(), *r.end()))
        .min_by_key(|&rate| (rate.abs_diff(preferred), u32::MAX - rate))
}

/// Trait for audio output backends.
///
/// Implementations must be shareable with the dispatcher's worker thread.
pub trait DeviceChannel: Send + Sync {
    /// Snapshot of the output devices, default (`-1`) first.
    ///
    /// Never empty: if enumeration fails only the default entry is returned.
    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Number of real devices (excluding the default entry).
    fn device_count(&self) -> usize;

    /// Sample rate the device can play a block at, given the rate the
    /// caller would like. Backends that play any rate return `preferred`.
    fn output_rate(&self, device_index: i32, preferred: u32) -> Result<u32, DeviceError> {
        check_index(device_index, self.device_count())?;
        Ok(preferred)
    }

    /// Play `block` on the selected device, blocking until the last sample
    /// has been handed to the hardware.
    fn play(&self, block: &SampleBlock, device_index: i32) -> Result<(), DeviceError>;
}
