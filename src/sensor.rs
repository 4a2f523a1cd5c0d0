use regex::Regex;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::OnceLock,
};
use thiserror::Error;

use crate::{config::Thresholds, util};

/// Reported in place of a reading we could not get. Hotter than any
/// allowed on threshold, so a blind sensor keeps the fan running.
pub const SENSOR_FAILURE_C: f32 = 255.0;

/// Kernel thermal zone of the SoC on a Raspberry Pi
pub const CPU_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("command {name} failed: {source}")]
    Command {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("command {name} exited with {status}")]
    CommandStatus { name: String, status: ExitStatus },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse temperature from '{0}'")]
    Parse(String),
}

/// Anything that can tell us a temperature in degrees Celsius
pub trait TemperatureSource {
    fn read(&self) -> Result<f32, SensorError>;
}

/// `vcgencmd measure_temp`, prints something like `temp=48.3'C`
#[derive(Debug, Default)]
pub struct VcgencmdSource;

impl TemperatureSource for VcgencmdSource {
    fn read(&self) -> Result<f32, SensorError> {
        let out = util::make_call("vcgencmd", "vcgencmd", &["measure_temp"])?;
        parse_vcgencmd(&out)
    }
}

pub fn parse_vcgencmd(out: &str) -> Result<f32, SensorError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"temp=(?<t>-?\d+(?:\.\d+)?)'C").unwrap());

    re.captures(out)
        .and_then(|c| c["t"].parse().ok())
        .ok_or_else(|| SensorError::Parse(out.trim().to_string()))
}

/// A sysfs file holding millidegrees Celsius as plain text
#[derive(Debug)]
pub struct ThermalZoneSource {
    path: PathBuf,
}

impl ThermalZoneSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ThermalZoneSource {
    fn default() -> Self {
        Self::new(CPU_THERMAL_ZONE)
    }
}

impl TemperatureSource for ThermalZoneSource {
    fn read(&self) -> Result<f32, SensorError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| SensorError::Io {
            path: self.path.clone(),
            source: err,
        })?;
        let milli: i64 = raw
            .trim()
            .parse()
            .map_err(|_| SensorError::Parse(raw.trim().to_string()))?;
        Ok(milli as f32 / 1000.)
    }
}

/// One sample of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub channel: &'static str,
    pub celsius: f32,
    pub thresholds: Thresholds,
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1}", self.channel, self.celsius)
    }
}

/// A monitored temperature source with its own trip points
pub struct Channel {
    pub name: &'static str,
    pub thresholds: Thresholds,
    source: Box<dyn TemperatureSource>,
}

impl Channel {
    pub fn new(
        name: &'static str,
        thresholds: Thresholds,
        source: Box<dyn TemperatureSource>,
    ) -> Self {
        Self {
            name,
            thresholds,
            source,
        }
    }

    /// Never fails: an unreadable sensor reads as [`SENSOR_FAILURE_C`]
    pub fn sample(&self) -> TemperatureReading {
        let celsius = self.source.read().unwrap_or_else(|err| {
            log::error!(
                "ALERT: cannot read {} temp ({}). Returning {}C.",
                self.name,
                err,
                SENSOR_FAILURE_C
            );
            SENSOR_FAILURE_C
        });

        TemperatureReading {
            channel: self.name,
            celsius,
            thresholds: self.thresholds,
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}
