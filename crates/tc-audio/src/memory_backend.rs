//! In-memory device channel.
//!
//! Records every block instead of sending it to hardware. Used for dry runs
//! and by tests that need to observe what a dispatcher actually played.

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::thread;
use tc_engine::SampleBlock;
use tracing::debug;

use crate::traits::{
    check_index, choose_rate, DeviceChannel, DeviceDescriptor, DeviceError, DEFAULT_DEVICE_INDEX,
    DEFAULT_DEVICE_NAME,
};

/// One completed playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Played {
    pub device_index: i32,
    pub block: SampleBlock,
}

#[derive(Default)]
struct MemoryState {
    played: Vec<Played>,
    failures_pending: usize,
}

/// A device channel with a fixed set of named fake devices.
pub struct MemoryChannel {
    names: Vec<String>,
    realtime: bool,
    rates: Option<Vec<RangeInclusive<u32>>>,
    state: Mutex<MemoryState>,
}

impl MemoryChannel {
    /// Create a channel exposing `names` as devices `0..names.len()`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            realtime: false,
            rates: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Block in `play` for the block's real duration, like hardware would.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Only accept blocks at these sample rates, like hardware locked to
    /// its mix rate. By default any rate plays.
    pub fn supported_rates(mut self, rates: impl IntoIterator<Item = RangeInclusive<u32>>) -> Self {
        self.rates = Some(rates.into_iter().collect());
        self
    }

    /// Make the next `count` valid playbacks fail.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_pending = count;
    }

    /// Everything played so far, oldest first.
    pub fn played(&self) -> Vec<Played> {
        self.lock().played.clone()
    }

    pub fn play_count(&self) -> usize {
        self.lock().played.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceChannel for MemoryChannel {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        std::iter::once(DeviceDescriptor::new(DEFAULT_DEVICE_INDEX, DEFAULT_DEVICE_NAME))
            .chain(
                self.names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| DeviceDescriptor::new(i as i32, name.clone())),
            )
            .collect()
    }

    fn device_count(&self) -> usize {
        self.names.len()
    }

    fn output_rate(&self, device_index: i32, preferred: u32) -> Result<u32, DeviceError> {
        check_index(device_index, self.names.len())?;
        match &self.rates {
            None => Ok(preferred),
            Some(rates) => choose_rate(rates, preferred)
                .ok_or_else(|| DeviceError::PlaybackFailed("no supported sample rate".into())),
        }
    }

    fn play(&self, block: &SampleBlock, device_index: i32) -> Result<(), DeviceError> {
        check_index(device_index, self.names.len())?;
        if let Some(rates) = &self.rates {
            if !rates.iter().any(|r| r.contains(&block.sample_rate())) {
                return Err(DeviceError::PlaybackFailed(format!(
                    "device cannot output {} Hz",
                    block.sample_rate()
                )));
            }
        }

        {
            let mut state = self.lock();
            if state.failures_pending > 0 {
                state.failures_pending -= 1;
                return Err(DeviceError::PlaybackFailed("injected failure".into()));
            }
        }

        if self.realtime {
            thread::sleep(block.duration());
        }

        debug!("Recorded {} samples for device {}", block.len(), device_index);
        self.lock().played.push(Played {
            device_index,
            block: block.clone(),
        });
        Ok(())
    }
}
