// Raspberry Pi fan control daemon: switch a fan on a GPIO pin between two
// temperature thresholds.
// Running more than one instance against the same pin is not guarded
// against here, leave that to the service manager.

mod config;
mod controller;
mod daemon;
mod gpio;
mod logging;
mod sensor;
mod util;


use clap::Parser;
use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;

use config::{Config, ConfigError};
use controller::FanState;
use daemon::Daemon;
use gpio::{Actuator, GpioError, MockPin, RppalPin};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "pifancontrol")]
#[command(version, about = "Raspberry Pi Fan Control daemon", long_about = None)]
struct Args {
    /// INI file with a [fancontrol] section
    #[arg(short, long, default_value = config::CONFIG_PATH)]
    config: PathBuf,

    /// Also monitor the GPU, the fan runs if either is hot
    #[arg(long)]
    gpu: bool,

    /// Drive an in-memory pin instead of the GPIO header
    #[arg(long)]
    mock: bool,

    /// Log every reading
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("cannot open GPIO {pin}: {source}")]
    Gpio {
        pin: u8,
        #[source]
        source: GpioError,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = Config::load(&args.config).with_gpu(args.gpu);

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_handler_ref = keep_running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        log::info!("stopping...");
        keep_running_handler_ref.store(false, Ordering::SeqCst);
    }) {
        log::error!("ERROR: cannot install signal handler: {}", err);
        return ExitCode::FAILURE;
    }

    let result = if args.mock {
        start(&config, |_| Ok(MockPin::new(FanState::Off)), keep_running)
            .map(|mock| log::debug!("mock pin switched {} times", mock.fan().applied))
    } else {
        start(&config, RppalPin::open, keep_running).map(|_| ())
    };

    if let Err(err) = &result {
        log::error!("ERROR: {}. Aborting", err);
    }
    ExitCode::from(exit_code(&result))
}

/// Validate the config, then take over the pin with `open` and poll until
/// `keep_running` clears. An invalid config never reaches `open`.
fn start<A, F>(
    config: &Config,
    open: F,
    keep_running: Arc<AtomicBool>,
) -> Result<Daemon<A>, StartupError>
where
    A: Actuator,
    F: FnOnce(u8) -> Result<A, GpioError>,
{
    config.validate()?;

    log::info!(
        "Raspberry Pi Fan Control daemon ({}). {}",
        VERSION,
        config.summary()
    );

    let fan = open(config.gpio_pin).map_err(|source| StartupError::Gpio {
        pin: config.gpio_pin,
        source,
    })?;
    match fan.current_state() {
        Ok(state) => log::info!("Fan is {} at startup", state),
        Err(err) => log::error!("ALERT: cannot read fan state: {}", err),
    }

    let mut daemon = Daemon::new(daemon::channels(config), fan, config.sleep_interval());
    daemon.run(keep_running);
    Ok(daemon)
}

fn exit_code<T>(result: &Result<T, StartupError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
