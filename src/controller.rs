use std::fmt;

use crate::sensor::TemperatureReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanState {
    Off,
    On,
}

impl fmt::Display for FanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanState::Off => write!(f, "OFF"),
            FanState::On => write!(f, "ON"),
        }
    }
}

/// Two-threshold switching rule over any number of channels.
///
/// The fan goes on when *any* channel is above its on threshold and goes
/// off only when *all* channels are below their off thresholds. Between
/// the two nothing changes, which is what keeps the relay from chattering
/// around a single trip point.
///
/// Each reading carries its own channel's thresholds, so there is no
/// separate threshold table to pass in.
///
/// Returns the state to switch to, or `None` to leave the fan alone.
pub fn decide(readings: &[TemperatureReading], current: FanState) -> Option<FanState> {
    let want_on = readings.iter().any(|r| r.thresholds.is_hot(r.celsius));
    let want_off =
        !readings.is_empty() && readings.iter().all(|r| r.thresholds.is_cool(r.celsius));

    match current {
        // on wins if both could be true
        FanState::Off if want_on => Some(FanState::On),
        FanState::On if want_off && !want_on => Some(FanState::Off),
        _ => None,
    }
}
