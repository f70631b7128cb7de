//! CPAL-based device channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Host, HostId, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, SupportedStreamConfig, SupportedStreamConfigRange,
};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::ops::RangeInclusive;
use std::sync::{Arc, Condvar, Mutex};
use tc_engine::SampleBlock;
use tracing::{debug, error, warn};

use crate::traits::{
    check_index, choose_rate, DeviceChannel, DeviceDescriptor, DeviceError, DEFAULT_DEVICE_INDEX,
    DEFAULT_DEVICE_NAME,
};

/// Silent callbacks to wait for after the ring drains, so the last real
/// samples have left the device buffer before `play` returns.
const DRAIN_CALLBACKS: u32 = 2;

/// Device channel backed by a CPAL host.
///
/// Holds only the host id; devices and streams are opened per call, so
/// the channel can be shared with a worker thread.
#[derive(Clone, Copy, Debug)]
pub struct CpalChannel {
    host_id: HostId,
}

impl CpalChannel {
    /// Channel on the platform's default host.
    pub fn new() -> Self {
        Self { host_id: cpal::default_host().id() }
    }

    pub fn with_host(host_id: HostId) -> Self {
        Self { host_id }
    }

    fn host(&self) -> Result<Host, DeviceError> {
        cpal::host_from_id(self.host_id).map_err(|e| DeviceError::PlaybackFailed(e.to_string()))
    }
}

impl Default for CpalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceChannel for CpalChannel {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let host = match self.host() {
            Ok(host) => host,
            Err(e) => {
                warn!("Audio host unavailable: {}", e);
                return vec![DeviceDescriptor::new(DEFAULT_DEVICE_INDEX, DEFAULT_DEVICE_NAME)];
            }
        };

        let default_name = host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        let mut devices = vec![DeviceDescriptor::new(DEFAULT_DEVICE_INDEX, default_name)];

        match host.output_devices() {
            Ok(outputs) => {
                for (i, device) in outputs.enumerate() {
                    let name = device.name().unwrap_or_else(|_| format!("Output {}", i));
                    devices.push(DeviceDescriptor::new(i as i32, name));
                }
            }
            Err(e) => warn!("Output device enumeration failed: {}", e),
        }

        debug!("Enumerated {} output device(s)", devices.len() - 1);
        devices
    }

    fn device_count(&self) -> usize {
        self.host()
            .ok()
            .and_then(|host| host.output_devices().ok().map(|d| d.count()))
            .unwrap_or(0)
    }

    fn output_rate(&self, device_index: i32, preferred: u32) -> Result<u32, DeviceError> {
        check_index(device_index, self.device_count())?;

        let host = self.host()?;
        let device = select_device(&host, device_index)?;
        let configs = device
            .supported_output_configs()
            .map_err(|e| DeviceError::PlaybackFailed(e.to_string()))?;
        let rate = choose_rate(&usable_rates(configs), preferred).ok_or_else(|| {
            DeviceError::PlaybackFailed("device has no usable output config".into())
        })?;
        if rate != preferred {
            debug!(
                "Device {} cannot run at {} Hz, rendering at {} Hz",
                device_index, preferred, rate
            );
        }
        Ok(rate)
    }

    fn play(&self, block: &SampleBlock, device_index: i32) -> Result<(), DeviceError> {
        check_index(device_index, self.device_count())?;

        let host = self.host()?;
        let device = select_device(&host, device_index)?;
        let config = select_config(&device, block.sample_rate())?;
        debug!(
            "Playing {} samples on device {} ({} ch, {:?})",
            block.len(),
            device_index,
            config.channels(),
            config.sample_format()
        );

        let playback = Playback::new();
        let stream_config: StreamConfig = config.config();
        let stream = match config.sample_format() {
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, block, &playback)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, block, &playback)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, block, &playback)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, block, &playback)?,
            format => {
                return Err(DeviceError::PlaybackFailed(format!(
                    "unsupported sample format {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::PlaybackFailed(e.to_string()))?;
        let result = playback.wait();
        drop(stream);
        result
    }
}

fn select_device(host: &Host, index: i32) -> Result<Device, DeviceError> {
    let device = if index == DEFAULT_DEVICE_INDEX {
        host.default_output_device()
    } else {
        host.output_devices()
            .ok()
            .and_then(|mut devices| devices.nth(index as usize))
    };
    device.ok_or(DeviceError::NoDevice(index))
}

/// Pick a config that runs at the block's own rate, so no resampling
/// touches the carrier. Fewest channels wins, then the cheapest format.
fn select_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig, DeviceError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| DeviceError::PlaybackFailed(e.to_string()))?;

    ranges
        .filter(|r| r.min_sample_rate().0 <= sample_rate && sample_rate <= r.max_sample_rate().0)
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (r, rank)))
        .min_by_key(|(r, rank)| (r.channels(), *rank))
        .map(|(r, _)| r.with_sample_rate(SampleRate(sample_rate)))
        .ok_or_else(|| {
            DeviceError::PlaybackFailed(format!("device cannot output {} Hz", sample_rate))
        })
}

/// Sample rate ranges of the configs `build_stream` can drive.
fn usable_rates(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
) -> Vec<RangeInclusive<u32>> {
    configs
        .filter(|r| format_rank(r.sample_format()).is_some())
        .map(|r| r.min_sample_rate().0..=r.max_sample_rate().0)
        .collect()
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::I32 => Some(2),
        SampleFormat::U16 => Some(3),
        _ => None,
    }
}

/// Copy the whole block into a ring sized to hold it.
fn fill_ring(block: &SampleBlock) -> HeapCons<i16> {
    let rb = HeapRb::<i16>::new(block.len().max(1));
    let (mut producer, consumer) = rb.split();
    let pushed = producer.push_slice(block.samples());
    debug_assert_eq!(pushed, block.len());
    consumer
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    block: &SampleBlock,
    playback: &Playback,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels as usize;
    let mut consumer = fill_ring(block);
    let mut drained_callbacks = 0u32;
    let done = playback.clone();
    let failed = playback.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Mono source: the same sample goes to every device channel
                for frame in data.chunks_mut(channels) {
                    let value = match consumer.try_pop() {
                        Some(sample) => T::from_sample(sample),
                        None => T::EQUILIBRIUM,
                    };
                    frame.fill(value);
                }
                if consumer.is_empty() {
                    drained_callbacks += 1;
                    if drained_callbacks == DRAIN_CALLBACKS {
                        done.finish(PlaybackState::Finished);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                failed.finish(PlaybackState::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::PlaybackFailed(e.to_string()))
}

#[derive(Debug)]
enum PlaybackState {
    Playing,
    Finished,
    Failed(String),
}

/// Completion signal shared between `play` and the stream callbacks.
#[derive(Clone)]
struct Playback {
    inner: Arc<(Mutex<PlaybackState>, Condvar)>,
}

impl Playback {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(PlaybackState::Playing), Condvar::new())),
        }
    }

    /// First terminal state wins.
    fn finish(&self, state: PlaybackState) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*guard, PlaybackState::Playing) {
            *guard = state;
            cvar.notify_all();
        }
    }

    /// Block until the stream finished or failed. No timeout.
    fn wait(&self) -> Result<(), DeviceError> {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let guard = cvar
            .wait_while(guard, |state| matches!(state, PlaybackState::Playing))
            .unwrap_or_else(|e| e.into_inner());
        match &*guard {
            PlaybackState::Failed(msg) => Err(DeviceError::PlaybackFailed(msg.clone())),
            PlaybackState::Playing | PlaybackState::Finished => Ok(()),
        }
    }
}
