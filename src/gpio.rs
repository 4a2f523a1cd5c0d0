use rppal::gpio::{Gpio, Level, OutputPin};
use thiserror::Error;

use crate::controller::FanState;

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// The output that switches the fan. Holds the only truth about whether
/// the fan is running.
pub trait Actuator {
    /// Read back the output level, never a cached copy
    fn current_state(&self) -> Result<FanState, GpioError>;

    /// Drive the output. Applying the state it is already in is harmless.
    fn apply(&mut self, state: FanState) -> Result<(), GpioError>;
}

impl From<Level> for FanState {
    fn from(level: Level) -> Self {
        match level {
            Level::High => FanState::On,
            Level::Low => FanState::Off,
        }
    }
}

/// A BCM-numbered pin on the Pi's GPIO header, active high
pub struct RppalPin {
    pin: OutputPin,
}

impl RppalPin {
    /// Claim `pin` as an output at the level it already has, so a fan that
    /// is running when the daemon starts stays running. The level is left
    /// alone when the daemon exits.
    pub fn open(pin: u8) -> Result<Self, GpioError> {
        let pin = Gpio::new()?.get(pin)?;
        let initial = pin.read();
        log::debug!(
            "gpio{} is {} before taking it over",
            pin.pin(),
            FanState::from(initial)
        );

        let mut pin = match initial {
            Level::High => pin.into_output_high(),
            Level::Low => pin.into_output_low(),
        };
        pin.set_reset_on_drop(false);

        Ok(Self { pin })
    }
}

impl Actuator for RppalPin {
    fn current_state(&self) -> Result<FanState, GpioError> {
        Ok(if self.pin.is_set_high() {
            FanState::On
        } else {
            FanState::Off
        })
    }

    fn apply(&mut self, state: FanState) -> Result<(), GpioError> {
        log::debug!("gpio{} <- {}", self.pin.pin(), state);
        match state {
            FanState::On => self.pin.set_high(),
            FanState::Off => self.pin.set_low(),
        }
        Ok(())
    }
}

/// In-memory output for `--mock` runs and tests
#[derive(Debug, Clone)]
pub struct MockPin {
    state: FanState,
    /// Number of `apply` calls, including ones that change nothing
    pub applied: usize,
}

impl MockPin {
    pub fn new(initial: FanState) -> Self {
        Self {
            state: initial,
            applied: 0,
        }
    }
}

impl Actuator for MockPin {
    fn current_state(&self) -> Result<FanState, GpioError> {
        Ok(self.state)
    }

    fn apply(&mut self, state: FanState) -> Result<(), GpioError> {
        log::debug!("mock pin <- {}", state);
        self.state = state;
        self.applied += 1;
        Ok(())
    }
}
