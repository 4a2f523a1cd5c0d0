use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::{
    config::Config,
    controller::{self, FanState},
    gpio::Actuator,
    sensor::{Channel, TemperatureReading, ThermalZoneSource, VcgencmdSource},
};

/// Single-channel setups read the CPU through `vcgencmd`. With the GPU
/// enabled the CPU comes from the kernel thermal zone and `vcgencmd`
/// answers for the GPU.
pub fn channels(config: &Config) -> Vec<Channel> {
    if config.gpu_enabled {
        vec![
            Channel::new("CPU", config.cpu, Box::new(ThermalZoneSource::default())),
            Channel::new("GPU", config.gpu, Box::new(VcgencmdSource)),
        ]
    } else {
        vec![Channel::new("CPU", config.cpu, Box::new(VcgencmdSource))]
    }
}

pub struct Daemon<A: Actuator> {
    channels: Vec<Channel>,
    fan: A,
    sleep_interval: Duration,
}

impl<A: Actuator> Daemon<A> {
    pub fn new(channels: Vec<Channel>, fan: A, sleep_interval: Duration) -> Self {
        Self {
            channels,
            fan,
            sleep_interval,
        }
    }

    pub fn fan(&self) -> &A {
        &self.fan
    }

    /// Sample, decide, maybe switch. Returns the state the fan was
    /// switched to, if it was.
    pub fn step(&mut self) -> Option<FanState> {
        let readings: Vec<TemperatureReading> =
            self.channels.iter().map(Channel::sample).collect();
        log::debug!("temps: {}", format_readings(&readings));

        let current = match self.fan.current_state() {
            Ok(state) => state,
            Err(err) => {
                log::error!("ALERT: cannot read fan state: {}", err);
                return None;
            }
        };

        let next = controller::decide(&readings, current)?;
        if let Err(err) = self.fan.apply(next) {
            log::error!("ALERT: cannot switch fan {}: {}", next, err);
            return None;
        }

        log::info!("Fan {}: {}", next, format_readings(&readings));
        Some(next)
    }

    /// Loop until `keep_running` is cleared
    pub fn run(&mut self, keep_running: Arc<AtomicBool>) {
        while keep_running.load(Ordering::SeqCst) {
            self.step();
            thread::sleep(self.sleep_interval);
        }
    }
}

fn format_readings(readings: &[TemperatureReading]) -> String {
    readings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Thresholds, gpio::MockPin, sensor::SENSOR_FAILURE_C};

    #[test]
    fn formats_readings_for_the_log() {
        let readings = [
            TemperatureReading {
                channel: "CPU",
                celsius: 71.3,
                thresholds: Thresholds::new(70, 55),
            },
            TemperatureReading {
                channel: "GPU",
                celsius: SENSOR_FAILURE_C,
                thresholds: Thresholds::new(70, 55),
            },
        ];
        assert_eq!(format_readings(&readings), "CPU: 71.3, GPU: 255.0");
    }

    #[test]
    fn channel_layout_follows_gpu_flag() {
        let config = Config::default();
        let names: Vec<_> = channels(&config).iter().map(|c| c.name).collect();
        assert_eq!(names, ["CPU"]);

        let config = Config {
            gpu: Thresholds::new(80, 60),
            ..config
        }
        .with_gpu(true);
        let channels = channels(&config);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].name, "GPU");
        assert_eq!(channels[1].thresholds, Thresholds::new(80, 60));
    }

    #[test]
    fn run_returns_once_stopped() {
        let mut daemon = Daemon::new(Vec::new(), MockPin::new(FanState::Off), Duration::ZERO);
        daemon.run(Arc::new(AtomicBool::new(false)));
        assert_eq!(daemon.fan().applied, 0);
    }
}
