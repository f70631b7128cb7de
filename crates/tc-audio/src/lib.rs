//! Audio output device channels for treadmill chirps.
//!
//! A [`DeviceChannel`] enumerates output devices and plays a rendered
//! [`SampleBlock`](tc_engine::SampleBlock) to completion on one of them.

mod cpal_backend;
mod memory_backend;
mod traits;

pub use cpal_backend::CpalChannel;
pub use memory_backend::{MemoryChannel, Played};
pub use traits::{
    check_index, choose_rate, DeviceChannel, DeviceDescriptor, DeviceError, DEFAULT_DEVICE_INDEX,
    DEFAULT_DEVICE_NAME,
};
