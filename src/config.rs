//! Command-line options and the configuration file.
//!
//! The file is line oriented:
//!
//! ```text
//! # comment
//! i2c_dev = /dev/i2c-1
//! gpio_interrupt_chip = gpiochip0
//! gpio_interrupt_line = 17
//! poll_interval = 30
//! low_charge_voltage_mv = 3300
//! low_charge_percent = 5
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::monitor::MonitorConfig;

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sw6106.conf";

/// Accepted `low_charge_voltage_mv` values.
const VOLTAGE_RANGE_MV: (u32, u32) = (2000, 5000);
/// Accepted `low_charge_percent` values.
const PERCENT_RANGE: (u32, u32) = (1, 100);

/// Recognised configuration keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Key {
    I2cDev,
    GpioInterruptChip,
    GpioInterruptLine,
    PollInterval,
    LowChargeVoltageMv,
    LowChargePercent,
}

impl Key {
    const ALL: [Key; 6] = [
        Key::I2cDev,
        Key::GpioInterruptChip,
        Key::GpioInterruptLine,
        Key::PollInterval,
        Key::LowChargeVoltageMv,
        Key::LowChargePercent,
    ];

    fn name(self) -> &'static str {
        match self {
            Key::I2cDev => "i2c_dev",
            Key::GpioInterruptChip => "gpio_interrupt_chip",
            Key::GpioInterruptLine => "gpio_interrupt_line",
            Key::PollInterval => "poll_interval",
            Key::LowChargeVoltageMv => "low_charge_voltage_mv",
            Key::LowChargePercent => "low_charge_percent",
        }
    }

    fn lookup(name: &str) -> Option<Key> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

/// Configuration errors. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown option \"{option}\" at line {line}")]
    UnknownOption { option: String, line: usize },

    #[error("redefinition of \"{option}\" at line {line}")]
    Redefinition { option: String, line: usize },

    #[error("syntax error at line {line}")]
    Syntax { line: usize },

    #[error("invalid value \"{value}\" for {option} at line {line}")]
    InvalidValue {
        option: &'static str,
        value: String,
        line: usize,
    },

    #[error("{option} should have a value between {min} and {max} at line {line}")]
    OutOfRange {
        option: &'static str,
        min: u32,
        max: u32,
        line: usize,
    },

    #[error("poll_interval should have a value greater than 0 at line {line}")]
    ZeroPollInterval { line: usize },

    #[error("I2C device is not specified")]
    MissingI2cDevice,

    #[error("both poll_interval and GPIO interrupts are disabled, unable to continue")]
    NoObservation,
}

/// Command-line options.
#[derive(Clone, Debug, Parser)]
#[command(name = "sw6106-monitor", about = "SW6106 battery monitor", version)]
pub struct Options {
    /// Query once and exit.
    #[arg(short, long)]
    pub single_run: bool,

    /// Override the I2C device (ignores i2c_dev in the config file).
    #[arg(short, long, alias = "i2c_dev", value_name = "PATH")]
    pub i2c_dev: Option<PathBuf>,

    /// Config file path.
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Values read from the configuration file, each already range checked.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileConfig {
    pub i2c_dev: Option<PathBuf>,
    pub gpio_chip: Option<String>,
    pub gpio_line: Option<u32>,
    pub poll_interval: Option<Duration>,
    pub low_charge_voltage_mv: Option<u16>,
    pub low_charge_percent: Option<u8>,
}

fn parse_value<T: FromStr>(
    option: &'static str,
    value: &str,
    line: usize,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option,
        value: value.to_string(),
        line,
    })
}

fn check_range(
    option: &'static str,
    value: u32,
    (min, max): (u32, u32),
    line: usize,
) -> Result<u32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            option,
            min,
            max,
            line,
        })
    }
}

impl FileConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = FileConfig::default();
        let mut seen = Vec::with_capacity(Key::ALL.len());

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let mut tokens = raw.split_whitespace();
            let Some(option) = tokens.next() else {
                continue;
            };
            if option.starts_with('#') {
                continue;
            }

            let Some(key) = Key::lookup(option) else {
                return Err(ConfigError::UnknownOption {
                    option: option.to_string(),
                    line,
                });
            };
            if seen.contains(&key) {
                return Err(ConfigError::Redefinition {
                    option: option.to_string(),
                    line,
                });
            }
            seen.push(key);

            if tokens.next() != Some("=") {
                return Err(ConfigError::Syntax { line });
            }
            let value = tokens.next().ok_or(ConfigError::Syntax { line })?;
            let name = key.name();

            match key {
                Key::I2cDev => config.i2c_dev = Some(PathBuf::from(value)),
                Key::GpioInterruptChip => config.gpio_chip = Some(value.to_string()),
                Key::GpioInterruptLine => {
                    config.gpio_line = Some(parse_value(name, value, line)?);
                }
                Key::PollInterval => {
                    let seconds: u64 = parse_value(name, value, line)?;
                    if seconds == 0 {
                        return Err(ConfigError::ZeroPollInterval { line });
                    }
                    config.poll_interval = Some(Duration::from_secs(seconds));
                }
                Key::LowChargeVoltageMv => {
                    let mv = parse_value(name, value, line)?;
                    let mv = check_range(name, mv, VOLTAGE_RANGE_MV, line)?;
                    config.low_charge_voltage_mv = Some(mv as u16);
                }
                Key::LowChargePercent => {
                    let percent = parse_value(name, value, line)?;
                    let percent = check_range(name, percent, PERCENT_RANGE, line)?;
                    config.low_charge_percent = Some(percent as u8);
                }
            }
        }

        Ok(config)
    }
}

/// GPIO line carrying the SW6106 IRQ output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GpioSettings {
    pub chip: String,
    pub line: u32,
}

/// Fully resolved and validated settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    pub i2c_dev: PathBuf,
    pub single_run: bool,
    /// Present when both chip and line are configured.
    pub gpio: Option<GpioSettings>,
    pub poll_interval: Option<Duration>,
    pub low_charge_voltage_mv: Option<u16>,
    pub low_charge_percent: Option<u8>,
}

impl Settings {
    /// Merge the command line with the configuration file. The file is not read when
    /// both `--single-run` and `--i2c-dev` are given.
    pub fn load(options: &Options) -> Result<Self, ConfigError> {
        let file = if options.single_run && options.i2c_dev.is_some() {
            FileConfig::default()
        } else {
            FileConfig::load(&options.config)?
        };
        Self::resolve(options, file)
    }

    /// Merge already parsed sources.
    pub fn resolve(options: &Options, file: FileConfig) -> Result<Self, ConfigError> {
        let i2c_dev = options
            .i2c_dev
            .clone()
            .or(file.i2c_dev)
            .ok_or(ConfigError::MissingI2cDevice)?;

        let gpio = match (file.gpio_chip, file.gpio_line) {
            (Some(chip), Some(line)) => Some(GpioSettings { chip, line }),
            _ => None,
        };

        if !options.single_run && gpio.is_none() && file.poll_interval.is_none() {
            return Err(ConfigError::NoObservation);
        }

        Ok(Self {
            i2c_dev,
            single_run: options.single_run,
            gpio,
            poll_interval: file.poll_interval,
            low_charge_voltage_mv: file.low_charge_voltage_mv,
            low_charge_percent: file.low_charge_percent,
        })
    }

    /// Shutdown on low charge is on when any threshold is configured.
    pub fn power_off_on_low_charge(&self) -> bool {
        self.low_charge_percent.is_some() || self.low_charge_voltage_mv.is_some()
    }

    /// Loop policy derived from these settings.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            single_shot: self.single_run,
            power_off_on_low_charge: self.power_off_on_low_charge(),
            low_charge_percent: self.low_charge_percent,
            low_charge_voltage_mv: self.low_charge_voltage_mv,
        }
    }
}
