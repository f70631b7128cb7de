//! Core protocol types for the treadmill chirp interface.
//!
//! A command is a [`Setpoint`] (speed and incline in tenths) that is encoded
//! into a 32-symbol [`Frame`]. Everything downstream (tone synthesis, WAV
//! export, device playback) consumes frames.
//!
//! Designed to be `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

mod frame;
mod setpoint;

pub use frame::{encode, Frame, FrameError, FRAME_LEN, FRAMING_BITS};
pub use setpoint::{
    Setpoint, SetpointError, HARD_STOP, IGNORE_SPEED, MAX_INCLINE, MAX_SPEED, MIN_INCLINE,
    MIN_SPEED, PAUSE,
};
