//! Encode → synthesize → play pipeline for one device channel.

use std::sync::{Arc, Mutex};
use tc_audio::{DeviceChannel, DeviceError};
use tc_engine::{synthesize, SampleBlock, ToneParams};
use tc_ir::Setpoint;
use tracing::debug;

/// Owns a device channel and the tone used on it.
///
/// At most one transmission is on the line at a time: concurrent callers
/// queue on the line lock while the current block plays out.
pub struct Transmitter {
    channel: Arc<dyn DeviceChannel>,
    params: ToneParams,
    line: Mutex<()>,
}

impl Transmitter {
    pub fn new(channel: Arc<dyn DeviceChannel>, params: ToneParams) -> Self {
        Self {
            channel,
            params,
            line: Mutex::new(()),
        }
    }

    pub fn params(&self) -> &ToneParams {
        &self.params
    }

    pub fn channel(&self) -> &dyn DeviceChannel {
        self.channel.as_ref()
    }

    /// Render the full transmission for `setpoint` without playing it.
    pub fn render(&self, setpoint: Setpoint) -> SampleBlock {
        synthesize(&setpoint.encode(), &self.params)
    }

    /// Render `setpoint` at a rate the device can play.
    ///
    /// Falls back to the device's closest rate when it cannot run at the
    /// configured one; the envelope is re-derived for that rate rather
    /// than resampled.
    fn render_for(&self, setpoint: Setpoint, device_index: i32) -> Result<SampleBlock, DeviceError> {
        let preferred = self.params.sample_rate();
        let rate = self.channel.output_rate(device_index, preferred)?;
        if rate == preferred {
            return Ok(self.render(setpoint));
        }
        let params = self
            .params
            .with_sample_rate(rate)
            .map_err(|e| DeviceError::PlaybackFailed(e.to_string()))?;
        debug!("Rendering {} at {} Hz for device {}", setpoint, rate, device_index);
        Ok(synthesize(&setpoint.encode(), &params))
    }

    /// Play one transmission, blocking until it has finished.
    pub fn transmit(&self, setpoint: Setpoint, device_index: i32) -> Result<(), DeviceError> {
        let block = self.render_for(setpoint, device_index)?;
        let _line = self.line.lock().unwrap_or_else(|e| e.into_inner());
        debug!("Transmitting {} on device {}", setpoint, device_index);
        self.channel.play(&block, device_index)
    }
}
