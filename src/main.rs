//! `sw6106-monitor`: report SW6106 battery state and power the host off on low charge.
//!
//! ```text
//! USAGE:
//!   sw6106-monitor [-s] [-i <i2c-dev>] [-c <config>]
//! ```
//!
//! Reports go to stdout, diagnostics to stderr (`RUST_LOG` controls verbosity).

use std::io;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sw6106_rs::bus::I2cBus;
use sw6106_rs::config::{Options, Settings};
use sw6106_rs::gpio::GpioLine;
use sw6106_rs::monitor::{CancellationToken, Monitor, Observation};
use sw6106_rs::peripheral::share;
use sw6106_rs::power::SystemPowerOff;
use sw6106_rs::{signals, Sw6106};

/// GPIO consumer label shown by `gpioinfo`.
const GPIO_CONSUMER: &str = "sw6106-monitor";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options = Options::parse();
    let settings = Settings::load(&options).context("invalid configuration")?;

    let cancel = CancellationToken::new();
    signals::spawn_listener(cancel.clone()).context("failed to install signal handlers")?;

    let bus = share(I2cBus::open(&settings.i2c_dev)?);
    let chip = Sw6106::new(Rc::clone(&bus));

    // The IRQ line is only needed when running continuously.
    let observation = match (&settings.gpio, settings.single_run) {
        (Some(gpio), false) => Observation::Interrupt(
            GpioLine::request_falling_edge(&gpio.chip, gpio.line, GPIO_CONSUMER)
                .context("failed to set up the IRQ line")?,
        ),
        _ => Observation::Polling(settings.poll_interval.unwrap_or_default()),
    };

    let mut monitor = Monitor::new(
        chip,
        observation,
        SystemPowerOff::default(),
        settings.monitor_config(),
        cancel,
    );

    let stdout = io::stdout();
    let exit = monitor.run(&mut stdout.lock())?;
    info!(?exit, "exiting");
    Ok(())
}
