//! Speed/incline setpoints.

use core::fmt;

use crate::frame::{encode, Frame};

/// Speed sentinel: pauses the belt. Incline is left alone.
pub const PAUSE: u8 = 248;

/// Speed sentinel: keep the current speed and apply the incline only.
pub const IGNORE_SPEED: u8 = 200;

/// Sending this value as both speed and incline locks the console out of
/// remote control until its chirp mode is cycled by hand.
pub const HARD_STOP: u8 = 252;

/// Slowest speed a workout segment may request (0.5 mph).
pub const MIN_SPEED: u8 = 5;

/// Fastest speed a workout segment may request (10.0 mph).
pub const MAX_SPEED: u8 = 100;

/// Lowest incline a workout segment may request (0 % grade).
pub const MIN_INCLINE: u8 = 0;

/// Steepest incline a workout segment may request (12.0 % grade).
pub const MAX_INCLINE: u8 = 120;

/// Error type for setpoint construction and range checks.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SetpointError {
    /// Physical value does not fit a byte once scaled by 10
    #[error("{value} cannot be sent as tenths in a single byte")]
    Unrepresentable { value: f32 },
    /// Speed outside the workout segment limits
    #[error("speed {speed} is outside 5..=100 tenths of a mph")]
    SpeedOutOfRange { speed: u8 },
    /// Incline outside the workout segment limits
    #[error("incline {incline} is outside 0..=120 tenths of a percent")]
    InclineOutOfRange { incline: u8 },
}

/// A treadmill command: both fields are the physical value ×10.
///
/// No range checks are applied on construction. Sentinel bytes such as
/// [`PAUSE`] and [`IGNORE_SPEED`] are deliberately out of range and must
/// reach the encoder untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Setpoint {
    pub speed: u8,
    pub incline: u8,
}

impl Setpoint {
    pub const fn new(speed: u8, incline: u8) -> Self {
        Self { speed, incline }
    }

    /// Pause the belt, keeping `incline`.
    pub const fn pause(incline: u8) -> Self {
        Self::new(PAUSE, incline)
    }

    /// Change the incline only.
    pub const fn incline_only(incline: u8) -> Self {
        Self::new(IGNORE_SPEED, incline)
    }

    /// Build from miles per hour and percent grade, rounded to the nearest tenth.
    pub fn from_units(mph: f32, grade: f32) -> Result<Self, SetpointError> {
        Ok(Self::new(to_tenths(mph)?, to_tenths(grade)?))
    }

    pub fn speed_mph(&self) -> f32 {
        self.speed as f32 / 10.0
    }

    pub fn incline_percent(&self) -> f32 {
        self.incline as f32 / 10.0
    }

    /// True if the speed byte carries an out-of-band meaning.
    pub fn is_sentinel(&self) -> bool {
        matches!(self.speed, PAUSE | IGNORE_SPEED | HARD_STOP)
    }

    /// Check against the workout segment limits.
    ///
    /// Sentinel speeds skip the speed check; the incline is always checked
    /// because the console applies it even when the speed is ignored.
    /// The hard-stop pair is never accepted here.
    pub fn check_limits(&self) -> Result<(), SetpointError> {
        let speed_is_command = matches!(self.speed, PAUSE | IGNORE_SPEED);
        if !speed_is_command && !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(SetpointError::SpeedOutOfRange { speed: self.speed });
        }
        if !(MIN_INCLINE..=MAX_INCLINE).contains(&self.incline) {
            return Err(SetpointError::InclineOutOfRange { incline: self.incline });
        }
        Ok(())
    }

    /// Encode into a wire frame.
    pub fn encode(&self) -> Frame {
        encode(self.speed, self.incline)
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.speed {
            PAUSE => write!(f, "pause, incline {:.1}%", self.incline_percent()),
            IGNORE_SPEED => write!(f, "incline {:.1}%", self.incline_percent()),
            _ => write!(
                f,
                "{:.1} mph, incline {:.1}%",
                self.speed_mph(),
                self.incline_percent()
            ),
        }
    }
}

fn to_tenths(value: f32) -> Result<u8, SetpointError> {
    let scaled = libm::roundf(value * 10.0);
    if !(0.0..=255.0).contains(&scaled) {
        return Err(SetpointError::Unrepresentable { value });
    }
    Ok(scaled as u8)
}
