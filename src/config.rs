use regex::Regex;
use std::{fs, io, path::Path, sync::OnceLock, time::Duration};
use thiserror::Error;

use crate::sensor::SENSOR_FAILURE_C;

/// Where the daemon looks for overrides unless told otherwise
pub const CONFIG_PATH: &str = "/etc/fancontrol.conf";

/// The only INI section we read
pub const SECTION: &str = "fancontrol";

/// Keys here apply to every section unless the section sets them itself
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Turn the fan on above this CPU temperature
pub const CPU_ON_THRESHOLD_C: i32 = 70;
/// Turn the fan off below this CPU temperature
pub const CPU_OFF_THRESHOLD_C: i32 = 55;

pub const GPU_ON_THRESHOLD_C: i32 = 70;
pub const GPU_OFF_THRESHOLD_C: i32 = 55;

/// BCM numbering, try `pinout` on the board
pub const GPIO_PIN: u8 = 27;

/// Polling rate
/// How often we read temperatures and potentially switch the fan
pub const SLEEP_INTERVAL_S: u64 = 5;

/// On/off trip points of one channel. The gap between them is the dead-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub on_c: i32,
    pub off_c: i32,
}

impl Thresholds {
    pub fn new(on_c: i32, off_c: i32) -> Self {
        Self { on_c, off_c }
    }

    /// Strictly above the on threshold
    pub fn is_hot(&self, celsius: f32) -> bool {
        celsius > self.on_c as f32
    }

    /// Strictly below the off threshold
    pub fn is_cool(&self, celsius: f32) -> bool {
        celsius < self.off_c as f32
    }
}

/// Everything the daemon needs, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub gpio_pin: u8,
    pub sleep_interval_s: u64,
    pub cpu: Thresholds,
    pub gpu: Thresholds,
    /// Monitor the GPU as a second channel
    pub gpu_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio_pin: GPIO_PIN,
            sleep_interval_s: SLEEP_INTERVAL_S,
            cpu: Thresholds::new(CPU_ON_THRESHOLD_C, CPU_OFF_THRESHOLD_C),
            gpu: Thresholds::new(GPU_ON_THRESHOLD_C, GPU_OFF_THRESHOLD_C),
            gpu_enabled: false,
        }
    }
}

/// Problems with the config file itself. None of these stop the daemon.
#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("no [{0}] section")]
    MissingSection(String),
    #[error("cannot parse line {line}: '{text}'")]
    Syntax { line: usize, text: String },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Settings the daemon refuses to run with.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{channel} off temp ({off}C) must be below {channel} on temp ({on}C)")]
    InvertedThresholds { channel: &'static str, on: i32, off: i32 },
    #[error("{channel} on temp ({on}C) must be below the sensor failure reading")]
    ThresholdAboveSentinel { channel: &'static str, on: i32 },
    #[error("sleep interval must be at least one second")]
    ZeroInterval,
}

impl Config {
    /// Defaults overlaid with whatever `path` provides. A missing file is
    /// silently ignored, any other problem is logged and the affected
    /// values keep their defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = Self::default();

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("no config file at {}, using defaults", path.display());
                return config;
            }
            Err(err) => {
                log::info!(
                    "Error reading config file {}: {}",
                    path.display(),
                    ConfigFileError::from(err)
                );
                return config;
            }
        };

        match section_entries(&text, SECTION) {
            Ok(entries) => {
                for (key, value) in entries {
                    if let Err(err) = config.set(&key, &value) {
                        log::info!("Error reading config file {}: {}", path.display(), err);
                    }
                }
            }
            Err(err) => log::info!("Error reading config file {}: {}", path.display(), err),
        }

        config
    }

    /// Same settings with the GPU channel switched on or off
    pub fn with_gpu(self, gpu_enabled: bool) -> Self {
        Self {
            gpu_enabled,
            ..self
        }
    }

    /// Apply one `key = value` pair from the file
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigFileError> {
        let invalid = || ConfigFileError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key.to_ascii_uppercase().as_str() {
            "CPU_ON_THRESHOLD" => self.cpu.on_c = value.parse().map_err(|_| invalid())?,
            "CPU_OFF_THRESHOLD" => self.cpu.off_c = value.parse().map_err(|_| invalid())?,
            "GPU_ON_THRESHOLD" => self.gpu.on_c = value.parse().map_err(|_| invalid())?,
            "GPU_OFF_THRESHOLD" => self.gpu.off_c = value.parse().map_err(|_| invalid())?,
            "GPIO_PIN" => self.gpio_pin = value.parse().map_err(|_| invalid())?,
            "SLEEP_INTERVAL" => self.sleep_interval_s = value.parse().map_err(|_| invalid())?,
            _ => log::debug!("ignoring unknown config key {}", key),
        }
        Ok(())
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_s)
    }

    /// Channels the daemon monitors, in the order they are read
    pub fn channel_thresholds(&self) -> Vec<(&'static str, Thresholds)> {
        let mut channels = vec![("CPU", self.cpu)];
        if self.gpu_enabled {
            channels.push(("GPU", self.gpu));
        }
        channels
    }

    /// Checked once before any hardware is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (channel, t) in self.channel_thresholds() {
            if t.off_c >= t.on_c {
                return Err(ConfigError::InvertedThresholds {
                    channel,
                    on: t.on_c,
                    off: t.off_c,
                });
            }
            if t.on_c as f32 >= SENSOR_FAILURE_C {
                return Err(ConfigError::ThresholdAboveSentinel { channel, on: t.on_c });
            }
        }
        if self.sleep_interval_s == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// One line for the startup log
    pub fn summary(&self) -> String {
        let thresholds = self
            .channel_thresholds()
            .iter()
            .map(|(name, t)| format!("{} {}/{}", name, t.on_c, t.off_c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "GPIO: {}, interval: {}s, fan on/off temp: {}",
            self.gpio_pin, self.sleep_interval_s, thresholds
        )
    }
}

/// `key = value` pairs of `section`, in file order, preceded by the
/// `[DEFAULT]` pairs the section does not override
fn section_entries(text: &str, section: &str) -> Result<Vec<(String, String)>, ConfigFileError> {
    static SECTION_RE: OnceLock<Regex> = OnceLock::new();
    static ENTRY_RE: OnceLock<Regex> = OnceLock::new();
    let section_re = SECTION_RE.get_or_init(|| Regex::new(r"^\[(?<name>[^\]]+)\]$").unwrap());
    let entry_re = ENTRY_RE
        .get_or_init(|| Regex::new(r"^(?<key>[^=:\s][^=:]*?)\s*[=:]\s*(?<value>.*)$").unwrap());

    let mut current: Option<String> = None;
    let mut found = false;
    let mut entries = Vec::new();
    let mut defaults: Vec<(String, String)> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(c) = section_re.captures(line) {
            let name = c["name"].trim().to_string();
            found |= name == section;
            current = Some(name);
            continue;
        }

        let Some(c) = entry_re.captures(line) else {
            return Err(ConfigFileError::Syntax {
                line: idx + 1,
                text: raw.to_string(),
            });
        };

        match current.as_deref() {
            Some(name) if name == section => {
                entries.push((c["key"].to_string(), c["value"].trim().to_string()))
            }
            Some(DEFAULT_SECTION) => {
                defaults.push((c["key"].to_string(), c["value"].trim().to_string()))
            }
            Some(_) => {}
            // entries before any section header
            None => {
                return Err(ConfigFileError::Syntax {
                    line: idx + 1,
                    text: raw.to_string(),
                })
            }
        }
    }

    if !found {
        return Err(ConfigFileError::MissingSection(section.to_string()));
    }

    defaults.retain(|(key, _)| !entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)));
    defaults.extend(entries);
    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_str(contents: &str) -> Config {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        Config::load(file.path())
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("fancontrol.conf"));
        assert_eq!(config, Config::default());
        assert_eq!(config.cpu, Thresholds::new(70, 55));
        assert_eq!(config.gpu, Thresholds::new(70, 55));
        assert_eq!(config.gpio_pin, 27);
        assert_eq!(config.sleep_interval(), Duration::from_secs(5));
    }

    #[test]
    fn file_overrides_single_key() {
        let config = load_str("[fancontrol]\nCPU_ON_THRESHOLD=80\n");
        assert_eq!(config.cpu.on_c, 80);
        assert_eq!(config.cpu.off_c, CPU_OFF_THRESHOLD_C);
        assert_eq!(config.gpio_pin, GPIO_PIN);
    }

    #[test]
    fn file_overrides_all_keys() {
        let config = load_str(
            "# pi fan\n\
             [fancontrol]\n\
             CPU_ON_THRESHOLD = 65\n\
             CPU_OFF_THRESHOLD = 50\n\
             GPU_ON_THRESHOLD: 75\n\
             GPU_OFF_THRESHOLD: 60\n\
             GPIO_PIN = 17\n\
             ; comment\n\
             SLEEP_INTERVAL = 10\n",
        );
        assert_eq!(config.cpu, Thresholds::new(65, 50));
        assert_eq!(config.gpu, Thresholds::new(75, 60));
        assert_eq!(config.gpio_pin, 17);
        assert_eq!(config.sleep_interval_s, 10);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let config = load_str("[fancontrol]\ncpu_on_threshold = 72\n");
        assert_eq!(config.cpu.on_c, 72);
    }

    #[test]
    fn other_sections_are_ignored() {
        let config = load_str("[other]\nCPU_ON_THRESHOLD=99\n[fancontrol]\nGPIO_PIN=4\n");
        assert_eq!(config.cpu.on_c, CPU_ON_THRESHOLD_C);
        assert_eq!(config.gpio_pin, 4);
    }

    #[test]
    fn default_section_fills_in_missing_keys() {
        let config = load_str(
            "[DEFAULT]\nCPU_ON_THRESHOLD=80\nGPIO_PIN=4\n[fancontrol]\ngpio_pin=17\n",
        );
        assert_eq!(config.cpu.on_c, 80);
        assert_eq!(config.gpio_pin, 17);
    }

    #[test]
    fn default_section_alone_is_not_enough() {
        assert_eq!(load_str("[DEFAULT]\nCPU_ON_THRESHOLD=80\n"), Config::default());
    }

    #[test]
    fn with_gpu_keeps_everything_else() {
        let config = load_str("[fancontrol]\nGPU_ON_THRESHOLD=75\n").with_gpu(true);
        assert!(config.gpu_enabled);
        assert_eq!(config.gpu.on_c, 75);
        assert_eq!(config.cpu, Thresholds::new(70, 55));
    }

    #[test]
    fn pin_out_of_range_keeps_default() {
        assert_eq!(load_str("[fancontrol]\nGPIO_PIN=300\n").gpio_pin, GPIO_PIN);
    }

    #[test]
    fn invalid_value_keeps_default_for_that_key_only() {
        let config = load_str("[fancontrol]\nCPU_ON_THRESHOLD=hot\nGPIO_PIN=22\n");
        assert_eq!(config.cpu.on_c, CPU_ON_THRESHOLD_C);
        assert_eq!(config.gpio_pin, 22);
    }

    #[test]
    fn malformed_file_keeps_defaults() {
        assert_eq!(load_str("this is not ini\n"), Config::default());
        assert_eq!(load_str("CPU_ON_THRESHOLD=80\n"), Config::default());
        assert_eq!(load_str("[other]\nCPU_ON_THRESHOLD=80\n"), Config::default());
    }

    #[test]
    fn section_entries_reports_errors() {
        assert!(matches!(
            section_entries("[fancontrol]\ngarbage\n", SECTION),
            Err(ConfigFileError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            section_entries("", SECTION),
            Err(ConfigFileError::MissingSection(_))
        ));
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let config = Config {
            cpu: Thresholds::new(55, 70),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedThresholds {
                channel: "CPU",
                on: 55,
                off: 70
            })
        );

        let equal = Config {
            cpu: Thresholds::new(60, 60),
            ..Config::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn validate_checks_gpu_only_when_enabled() {
        let config = Config {
            gpu: Thresholds::new(50, 60),
            ..Config::default()
        };
        assert_eq!(config.validate(), Ok(()));

        assert!(matches!(
            config.with_gpu(true).validate(),
            Err(ConfigError::InvertedThresholds { channel: "GPU", .. })
        ));
    }

    #[test]
    fn validate_rejects_threshold_at_sentinel_and_zero_interval() {
        let hot = Config {
            cpu: Thresholds::new(255, 55),
            ..Config::default()
        };
        assert!(matches!(
            hot.validate(),
            Err(ConfigError::ThresholdAboveSentinel { .. })
        ));

        let zero = Config {
            sleep_interval_s: 0,
            ..Config::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn summary_lists_active_channels() {
        let config = Config::default();
        assert_eq!(
            config.summary(),
            "GPIO: 27, interval: 5s, fan on/off temp: CPU 70/55"
        );
        assert!(config.with_gpu(true).summary().ends_with("CPU 70/55, GPU 70/55"));
    }
}
