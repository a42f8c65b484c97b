//! Battery monitoring loop.
//!
//! The loop alternates between taking a snapshot of the chip and waiting for the next
//! reason to look again: an IRQ edge (interrupt mode) or a fixed interval (polling
//! mode). After every wait the interrupt latches are acknowledged and, once the ADC has
//! had time to settle, the status register is read again for the next decision.
//!
//! Cancellation is checked once per iteration only. A cancel that arrives during a wait
//! takes effect after the wait returns.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::driver::Sw6106;
use crate::gpio::{EdgeInput, WaitOutcome};
use crate::peripheral::RegisterAccess;
use crate::power::PowerOff;
use crate::registers::{Interrupts, SystemStatus};

/// Upper bound of one edge wait.
pub const EDGE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time the chip needs to refresh its status and ADC registers after an event.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Cooperative stop request shared between the loop and whoever stops it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop before its next iteration.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the loop learns that something may have changed.
pub enum Observation<E> {
    /// Wait for IRQ edges, at most [`EDGE_WAIT_TIMEOUT`] at a time.
    Interrupt(E),
    /// Sleep a fixed interval between looks.
    Polling(Duration),
}

/// Loop policy, already validated by the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MonitorConfig {
    /// Report once and exit.
    pub single_shot: bool,
    /// Power the host off when the battery runs low while discharging.
    pub power_off_on_low_charge: bool,
    /// Shut down below this charge percent.
    pub low_charge_percent: Option<u8>,
    /// Shut down below this battery voltage.
    pub low_charge_voltage_mv: Option<u16>,
}

/// Why [`Monitor::run`] returned successfully.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exit {
    /// Single-shot report printed.
    SingleShot,
    /// The host accepted the power-off request.
    PoweredOff,
    /// The cancellation token was triggered.
    Cancelled,
}

/// Fatal loop errors.
#[derive(Debug, Error)]
pub enum MonitorError<E> {
    /// Bus transaction with the chip failed.
    #[error("device error: {0}")]
    Device(E),

    /// The report stream could not be written.
    #[error("failed to write report: {0}")]
    Report(#[from] io::Error),
}

/// One report block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Report {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub status: SystemStatus,
    pub charge_percent: u8,
    /// Only meaningful while charging or discharging.
    pub battery_voltage_mv: Option<u16>,
    pub output_voltage_mv: Option<u16>,
    pub discharge_current_ma: Option<u16>,
    pub charge_current_ma: Option<u16>,
    /// Interrupts acknowledged since the previous look.
    pub events: Interrupts,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\n-----\n{}\nStatus:\n{}\n\nCharge: {}%",
            self.time, self.status, self.charge_percent
        )?;
        if let Some(mv) = self.battery_voltage_mv {
            write!(f, "\nBattery voltage: {mv} mV")?;
        }
        if let Some(mv) = self.output_voltage_mv {
            write!(f, "\nOutput voltage: {mv} mV")?;
        }
        if let Some(ma) = self.discharge_current_ma {
            write!(f, "\nDischarge current: {ma} mA")?;
        }
        if let Some(ma) = self.charge_current_ma {
            write!(f, "\nCharge current: {ma} mA")?;
        }
        if !self.events.is_empty() {
            write!(f, "\nEvents:\n{}", self.events)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LoopState {
    pending_events: usize,
    charging: bool,
    discharging: bool,
    charge_percent: u8,
    battery_voltage_mv: u16,
    shutdown_requested: bool,
    status: SystemStatus,
    interrupts: Interrupts,
}

/// The monitoring loop. Owns the chip driver and all loop state.
pub struct Monitor<R, E, P> {
    chip: Sw6106<R>,
    observation: Observation<E>,
    power: P,
    config: MonitorConfig,
    cancel: CancellationToken,
    settle_delay: Duration,
    state: LoopState,
}

impl<R, E, P> Monitor<R, E, P>
where
    R: RegisterAccess,
    E: EdgeInput,
    P: PowerOff,
{
    pub fn new(
        chip: Sw6106<R>,
        observation: Observation<E>,
        power: P,
        config: MonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chip,
            observation,
            power,
            config,
            cancel,
            settle_delay: SETTLE_DELAY,
            state: LoopState::default(),
        }
    }

    /// Override [`SETTLE_DELAY`].
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Run until single-shot completion, accepted power-off, cancellation or a bus error.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<Exit, MonitorError<R::Error>> {
        self.init(out)?;

        while !self.cancel.is_cancelled() {
            if self.should_snapshot() {
                let report = self.snapshot()?;
                writeln!(out, "{report}")?;

                if self.config.single_shot {
                    out.flush()?;
                    return Ok(Exit::SingleShot);
                }

                if self.apply_shutdown_policy(out)? {
                    return Ok(Exit::PoweredOff);
                }
            }

            self.wait();

            // Acknowledge latches every iteration, whether or not a snapshot was taken.
            self.state.interrupts = self.chip.read_interrupts().map_err(MonitorError::Device)?;

            thread::sleep(self.settle_delay);
            self.state.status = self.chip.get_system_status().map_err(MonitorError::Device)?;

            out.flush()?;
        }

        info!("monitor cancelled");
        Ok(Exit::Cancelled)
    }

    fn init<W: Write>(&mut self, out: &mut W) -> Result<(), MonitorError<R::Error>> {
        self.chip
            .enable_interrupts(Interrupts::all())
            .map_err(MonitorError::Device)?;
        // Stale latches from before start-up are not reported.
        let stale = self.chip.read_interrupts().map_err(MonitorError::Device)?;
        debug!(stale = stale.bits(), "cleared stale interrupts");
        self.state.status = self.chip.get_system_status().map_err(MonitorError::Device)?;

        let version = self.chip.get_chip_version().map_err(MonitorError::Device)?;
        info!(version, "sw6106 initialised");
        writeln!(out, "sw6106 chip version {version}")?;
        Ok(())
    }

    fn should_snapshot(&mut self) -> bool {
        if self.config.single_shot || self.state.pending_events > 0 {
            return true;
        }
        match &mut self.observation {
            Observation::Polling(_) => true,
            // An edge may have fired after the last wait returned.
            Observation::Interrupt(edge) => edge.is_active().unwrap_or_else(|err| {
                warn!(%err, "failed to read IRQ line level");
                true
            }),
        }
    }

    fn snapshot(&mut self) -> Result<Report, MonitorError<R::Error>> {
        self.state.pending_events = 0;
        self.state.charging = self.state.status.is_charging();
        self.state.discharging = self.state.status.is_discharging();
        self.state.charge_percent = self.chip.get_charge_percent().map_err(MonitorError::Device)?;

        let mut report = Report {
            time: chrono::Local::now().format("%T").to_string(),
            status: self.state.status,
            charge_percent: self.state.charge_percent,
            battery_voltage_mv: None,
            output_voltage_mv: None,
            discharge_current_ma: None,
            charge_current_ma: None,
            events: self.state.interrupts,
        };

        // The battery ADC reads 0 unless something is drawing from or feeding the battery.
        if self.state.charging || self.state.discharging {
            self.state.battery_voltage_mv = self
                .chip
                .get_battery_voltage_mv()
                .map_err(MonitorError::Device)?;
            report.battery_voltage_mv = Some(self.state.battery_voltage_mv);
        }
        if self.state.discharging {
            report.output_voltage_mv =
                Some(self.chip.get_output_voltage_mv().map_err(MonitorError::Device)?);
            report.discharge_current_ma =
                Some(self.chip.get_discharge_current_ma().map_err(MonitorError::Device)?);
        }
        if self.state.charging {
            report.charge_current_ma =
                Some(self.chip.get_charge_current_ma().map_err(MonitorError::Device)?);
        }
        Ok(report)
    }

    /// Returns `true` once the host accepted a power-off request.
    fn apply_shutdown_policy<W: Write>(&mut self, out: &mut W) -> io::Result<bool> {
        self.state.shutdown_requested = false;
        if !self.config.power_off_on_low_charge || self.state.charging || !self.state.discharging {
            return Ok(false);
        }

        if let Some(percent) = self.config.low_charge_percent {
            if self.state.charge_percent < percent {
                writeln!(out, "Charge percent is below {percent}%")?;
                self.state.shutdown_requested = true;
            }
        }
        if let Some(mv) = self.config.low_charge_voltage_mv {
            if self.state.battery_voltage_mv < mv {
                writeln!(out, "Battery voltage is below {mv} mV")?;
                self.state.shutdown_requested = true;
            }
        }
        if !self.state.shutdown_requested {
            return Ok(false);
        }

        writeln!(out, "Powering off...")?;
        out.flush()?;
        match self.power.power_off() {
            Ok(()) => {
                info!(
                    charge_percent = self.state.charge_percent,
                    battery_voltage_mv = self.state.battery_voltage_mv,
                    "power-off accepted"
                );
                writeln!(out, "System accepted power-off request, quitting...")?;
                out.flush()?;
                Ok(true)
            }
            Err(err) => {
                error!(%err, "power-off request failed");
                writeln!(out, "Power-off request failed: {err}")?;
                Ok(false)
            }
        }
    }

    fn wait(&mut self) {
        match &mut self.observation {
            Observation::Interrupt(edge) => {
                self.state.pending_events = match edge.wait_for_edge(EDGE_WAIT_TIMEOUT) {
                    Ok(WaitOutcome::Edges(count)) => count,
                    Ok(WaitOutcome::TimedOut) => 0,
                    Err(err) => {
                        debug!(%err, "edge wait failed");
                        0
                    }
                };
            }
            Observation::Polling(interval) => thread::sleep(*interval),
        }
    }
}
