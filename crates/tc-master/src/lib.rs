//! Headless controller for audio-modem treadmills.
//!
//! Provides the API a front end uses to drive the treadmill: device
//! enumeration, synchronous and background transmission, and offline
//! rendering of chirps.

pub mod config;
mod dispatcher;
mod transmitter;

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tc_audio::{CpalChannel, DeviceChannel, DeviceDescriptor, DeviceError, DEFAULT_DEVICE_INDEX};
use tc_engine::{SampleBlock, ToneParams};
use tc_ir::HARD_STOP;
use tracing::{debug, info};

// Re-export common types so callers don't need the lower crates directly.
pub use config::{Config, ConfigError, COMMAND_REPEAT_COUNT};
pub use dispatcher::{DispatchError, DispatchStats, Dispatcher, DispatcherState, Request};
pub use tc_audio::MemoryChannel;
pub use tc_formats::FormatError;
pub use tc_ir::{Setpoint, IGNORE_SPEED, PAUSE};
pub use transmitter::Transmitter;

/// Headless treadmill controller: owns the transmitter and, optionally,
/// a background dispatcher sharing it.
pub struct Controller {
    transmitter: Arc<Transmitter>,
    dispatcher: Option<Dispatcher>,
}

impl Controller {
    pub fn new(channel: Arc<dyn DeviceChannel>, params: ToneParams) -> Self {
        Self {
            transmitter: Arc::new(Transmitter::new(channel, params)),
            dispatcher: None,
        }
    }

    /// Controller on the system audio host.
    pub fn with_cpal(params: ToneParams) -> Self {
        Self::new(Arc::new(CpalChannel::new()), params)
    }

    pub fn params(&self) -> &ToneParams {
        self.transmitter.params()
    }

    // --- Devices ---

    /// Fresh snapshot of output devices, default first.
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.transmitter.channel().list_devices()
    }

    /// Device names in index order; entry 0 is the default device (index -1).
    pub fn list_output_devices(&self) -> Vec<String> {
        self.list_devices().into_iter().map(|d| d.name).collect()
    }

    /// Find a previously selected device by name in a fresh enumeration.
    ///
    /// Falls back to the default device when the name is gone.
    pub fn resolve_device(&self, name: &str) -> i32 {
        let found = self
            .list_devices()
            .into_iter()
            .find(|d| !d.is_default() && d.name == name)
            .map(|d| d.index);
        match found {
            Some(index) => index,
            None => {
                debug!("Device {:?} not found, using default output", name);
                DEFAULT_DEVICE_INDEX
            }
        }
    }

    // --- Synchronous transmission ---

    /// Send one command and block until it has played.
    pub fn transmit(&self, setpoint: Setpoint, device_index: i32) -> Result<(), DeviceError> {
        self.transmitter.transmit(setpoint, device_index)
    }

    /// Send the same command `count` times back to back, stopping at the
    /// first failure.
    pub fn transmit_repeated(
        &self,
        setpoint: Setpoint,
        device_index: i32,
        count: usize,
    ) -> Result<(), DeviceError> {
        for _ in 0..count {
            self.transmit(setpoint, device_index)?;
        }
        Ok(())
    }

    /// Stop the belt: set the incline with speed ignored, then pause.
    pub fn pause(&self, incline: u8, device_index: i32) -> Result<(), DeviceError> {
        info!("Pausing treadmill");
        self.transmit(Setpoint::incline_only(incline), device_index)?;
        self.transmit(Setpoint::pause(incline), device_index)
    }

    /// Put a freshly connected treadmill in a known state: paused, at `incline`.
    pub fn initialize(&self, incline: u8, device_index: i32) -> Result<(), DeviceError> {
        self.transmit(Setpoint::pause(incline), device_index)?;
        self.transmit(Setpoint::incline_only(incline), device_index)
    }

    /// Diagnostic sweep: send `(i, i)` for every byte from `start` to 254,
    /// waiting `interval` between sends.
    ///
    /// The hard-stop value is skipped, since it locks the console out of
    /// remote control. Stops at the first device error.
    pub fn sweep(
        &self,
        start: u8,
        device_index: i32,
        interval: Duration,
    ) -> Result<(), DeviceError> {
        info!("Sweeping {}..=254 on device {}", start, device_index);
        let mut values = (start..u8::MAX).filter(|&i| i != HARD_STOP).peekable();
        while let Some(i) = values.next() {
            self.transmit(Setpoint::new(i, i), device_index)?;
            debug!("Sweep sent {}", i);
            if values.peek().is_some() && !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        Ok(())
    }

    // --- Background dispatch ---

    /// Start the background dispatcher. No-op if it is already running.
    pub fn start_dispatcher(&mut self) -> Result<(), DispatchError> {
        if self.dispatcher.is_none() {
            self.dispatcher = Some(Dispatcher::spawn(self.transmitter.clone())?);
        }
        Ok(())
    }

    /// Queue a command on the dispatcher without blocking.
    pub fn submit(&self, setpoint: Setpoint, device_index: i32) -> Result<(), DispatchError> {
        self.dispatcher
            .as_ref()
            .ok_or(DispatchError::NotRunning)?
            .submit(setpoint, device_index)
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Stop the dispatcher, waiting for an in-flight transmission.
    pub fn stop_dispatcher(&mut self) -> Option<DispatchStats> {
        let mut dispatcher = self.dispatcher.take()?;
        dispatcher.shutdown();
        Some(dispatcher.stats())
    }

    // --- Offline rendering ---

    pub fn render(&self, setpoint: Setpoint) -> SampleBlock {
        self.transmitter.render(setpoint)
    }

    pub fn render_to_wav(&self, setpoint: Setpoint) -> Vec<u8> {
        tc_formats::block_to_wav(&self.render(setpoint))
    }

    /// Play an already rendered block, e.g. loaded from a WAV file.
    pub fn play_block(&self, block: &SampleBlock, device_index: i32) -> Result<(), DeviceError> {
        self.transmitter.channel().play(block, device_index)
    }
}
