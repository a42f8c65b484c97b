use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use sw6106_rs::gpio::{EdgeInput, WaitOutcome};
use sw6106_rs::monitor::{
    CancellationToken, Exit, Monitor, MonitorConfig, MonitorError, Observation, Report,
};
use sw6106_rs::peripheral::{share, Peripheral};
use sw6106_rs::power::{PowerOff, ShutdownError};
use sw6106_rs::registers::{Interrupts, SystemStatus};
use sw6106_rs::{Error, Sw6106, DEFAULT_I2C_ADDRESS};

const ADDR: u8 = DEFAULT_I2C_ADDRESS;

fn read(reg: u8, value: u8) -> I2cTrans {
    I2cTrans::write_read(ADDR, vec![reg], vec![value])
}

fn write(reg: u8, value: u8) -> I2cTrans {
    I2cTrans::write(ADDR, vec![reg, value])
}

/// Start-up sequence: enable everything, clear latches, read status and version.
fn init(status: u8) -> Vec<I2cTrans> {
    vec![
        write(0x09, 0x0F),
        write(0x0A, 0xFB),
        write(0x0B, 0xFF),
        write(0x0C, 0x7F),
        write(0x0D, 0x03),
        read(0x08, 0x00),
        read(0x07, 0x00),
        read(0x06, 0x00),
        read(0x05, 0x00),
        read(0x11, status),
        read(0x26, 6),
    ]
}

/// End of an iteration with no pending latches.
fn resync(status: u8) -> Vec<I2cTrans> {
    vec![
        read(0x08, 0x00),
        read(0x07, 0x00),
        read(0x06, 0x00),
        read(0x05, 0x00),
        read(0x11, status),
    ]
}

/// Replace the timestamp following each separator so output can be compared.
fn normalise(out: &[u8]) -> String {
    let text = String::from_utf8(out.to_vec()).unwrap();
    let mut previous = "";
    let mut lines = Vec::new();
    for line in text.split('\n') {
        if previous == "-----" {
            assert_eq!(line.len(), 8, "unexpected timestamp {line:?}");
            lines.push("TIME");
        } else {
            lines.push(line);
        }
        previous = line;
    }
    lines.join("\n")
}

/// Edge input replaying a fixed script. Cancels the token once the waits run out.
struct ScriptedEdge {
    waits: VecDeque<Result<WaitOutcome, String>>,
    levels: VecDeque<Result<bool, String>>,
    cancel: CancellationToken,
}

impl EdgeInput for ScriptedEdge {
    type Error = String;

    fn wait_for_edge(&mut self, _timeout: Duration) -> Result<WaitOutcome, String> {
        let next = self.waits.pop_front().unwrap_or(Ok(WaitOutcome::TimedOut));
        if self.waits.is_empty() {
            self.cancel.cancel();
        }
        next
    }

    fn is_active(&mut self) -> Result<bool, String> {
        self.levels.pop_front().unwrap_or(Ok(false))
    }
}

/// Power-off double that records calls and optionally cancels the loop on call `n`.
struct FakePowerOff {
    calls: Rc<Cell<usize>>,
    accept: bool,
    cancel: Option<(usize, CancellationToken)>,
}

impl FakePowerOff {
    fn new(accept: bool) -> Self {
        Self {
            calls: Rc::new(Cell::new(0)),
            accept,
            cancel: None,
        }
    }
}

impl PowerOff for FakePowerOff {
    fn power_off(&mut self) -> Result<(), ShutdownError> {
        self.calls.set(self.calls.get() + 1);
        if let Some((n, cancel)) = &self.cancel {
            if self.calls.get() == *n {
                cancel.cancel();
            }
        }
        if self.accept {
            Ok(())
        } else {
            Err(ShutdownError::Spawn {
                command: "poweroff".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "not found"),
            })
        }
    }
}

type TestMonitor = Monitor<Peripheral<I2cMock>, ScriptedEdge, FakePowerOff>;

fn polling_monitor(
    mock: &I2cMock,
    power: FakePowerOff,
    config: MonitorConfig,
    cancel: CancellationToken,
) -> TestMonitor {
    Monitor::new(
        Sw6106::new(share(mock.clone())),
        Observation::Polling(Duration::ZERO),
        power,
        config,
        cancel,
    )
    .with_settle_delay(Duration::ZERO)
}

#[test]
fn single_shot_reports_charging_state_and_exits() {
    let mut expectations = init(0x10);
    expectations.extend([
        read(0x4F, 55),
        // VBAT 0xC80 = 3200 -> 3840 mV
        read(0x15, 0x0C),
        read(0x14, 0x80),
        // ICHG 0x118 = 280 -> 1000 mA
        read(0x18, 0x01),
        read(0x17, 0x18),
    ]);
    let mut mock = I2cMock::new(&expectations);
    let power = FakePowerOff::new(true);
    let calls = power.calls.clone();
    let config = MonitorConfig {
        single_shot: true,
        power_off_on_low_charge: true,
        low_charge_percent: Some(90),
        low_charge_voltage_mv: Some(4_000),
    };
    let mut monitor = polling_monitor(&mock, power, config, CancellationToken::new());

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::SingleShot);
    assert_eq!(
        normalise(&out),
        "sw6106 chip version 6\n\
         \n\
         -----\n\
         TIME\n\
         Status:\n\
         \tCharger is connected\n\
         \n\
         Charge: 55%\n\
         Battery voltage: 3840 mV\n\
         Charge current: 1000 mA\n"
    );
    // Thresholds are breached but single-shot never shuts down.
    assert_eq!(calls.get(), 0);
    mock.done();
}

#[test]
fn idle_single_shot_skips_adc_reads() {
    let mut expectations = init(0x00);
    expectations.push(read(0x4F, 100));
    let mut mock = I2cMock::new(&expectations);
    let config = MonitorConfig {
        single_shot: true,
        ..MonitorConfig::default()
    };
    let mut monitor =
        polling_monitor(&mock, FakePowerOff::new(true), config, CancellationToken::new());

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::SingleShot);
    assert_eq!(
        normalise(&out),
        "sw6106 chip version 6\n\n-----\nTIME\nStatus:\n\tIdle\n\nCharge: 100%\n"
    );
    mock.done();
}

fn discharging_snapshot(percent: u8) -> Vec<I2cTrans> {
    vec![
        read(0x4F, percent),
        // VBAT 0xA00 = 2560 -> 3072 mV
        read(0x15, 0x4A),
        read(0x14, 0x00),
        // VOUT 0x4E2 = 1250 -> 5000 mV
        read(0x15, 0x4A),
        read(0x16, 0xE2),
        // IDISCHG 0x12C = 300 -> 1071 mA
        read(0x18, 0x10),
        read(0x19, 0x2C),
    ]
}

const DISCHARGING_REPORT: &str = "\n\
     -----\n\
     TIME\n\
     Status:\n\
     \tBoost converter is enabled\n\
     \n\
     Charge: 3%\n\
     Battery voltage: 3072 mV\n\
     Output voltage: 5000 mV\n\
     Discharge current: 1071 mA\n";

fn low_charge_config() -> MonitorConfig {
    MonitorConfig {
        single_shot: false,
        power_off_on_low_charge: true,
        low_charge_percent: Some(5),
        low_charge_voltage_mv: None,
    }
}

#[test]
fn low_charge_powers_off_and_quits() {
    let mut expectations = init(0x20);
    expectations.extend(discharging_snapshot(3));
    let mut mock = I2cMock::new(&expectations);
    let power = FakePowerOff::new(true);
    let calls = power.calls.clone();
    let mut monitor =
        polling_monitor(&mock, power, low_charge_config(), CancellationToken::new());

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::PoweredOff);
    assert_eq!(calls.get(), 1);
    assert_eq!(
        normalise(&out),
        format!(
            "sw6106 chip version 6\n{DISCHARGING_REPORT}\
             Charge percent is below 5%\n\
             Powering off...\n\
             System accepted power-off request, quitting...\n"
        )
    );
    mock.done();
}

#[test]
fn rejected_power_off_keeps_monitoring() {
    let mut expectations = init(0x20);
    expectations.extend(discharging_snapshot(3));
    expectations.extend(resync(0x20));
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    let mut power = FakePowerOff::new(false);
    power.cancel = Some((1, cancel.clone()));
    let calls = power.calls.clone();
    let mut monitor = polling_monitor(&mock, power, low_charge_config(), cancel);

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert_eq!(calls.get(), 1);
    assert_eq!(
        normalise(&out),
        format!(
            "sw6106 chip version 6\n{DISCHARGING_REPORT}\
             Charge percent is below 5%\n\
             Powering off...\n\
             Power-off request failed: failed to run poweroff: not found\n"
        )
    );
    mock.done();
}

#[test]
fn both_thresholds_are_reported() {
    let mut expectations = init(0x20);
    expectations.extend(discharging_snapshot(3));
    let mut mock = I2cMock::new(&expectations);
    let config = MonitorConfig {
        low_charge_voltage_mv: Some(3_300),
        ..low_charge_config()
    };
    let mut monitor =
        polling_monitor(&mock, FakePowerOff::new(true), config, CancellationToken::new());

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::PoweredOff);
    let text = normalise(&out);
    assert!(text.contains(
        "Charge percent is below 5%\nBattery voltage is below 3300 mV\nPowering off...\n"
    ));
    mock.done();
}

#[test]
fn low_voltage_alone_retries_after_rejection() {
    let mut expectations = init(0x20);
    expectations.extend(discharging_snapshot(50));
    expectations.extend(resync(0x20));
    expectations.extend(discharging_snapshot(50));
    expectations.extend(resync(0x20));
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    let mut power = FakePowerOff::new(false);
    power.cancel = Some((2, cancel.clone()));
    let calls = power.calls.clone();
    let config = MonitorConfig {
        low_charge_voltage_mv: Some(3_300),
        ..low_charge_config()
    };
    let mut monitor = polling_monitor(&mock, power, config, cancel);

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert_eq!(calls.get(), 2);
    let text = normalise(&out);
    assert_eq!(text.matches("Charge: 50%").count(), 2);
    assert_eq!(text.matches("Battery voltage is below 3300 mV\nPowering off...\n").count(), 2);
    assert_eq!(text.matches("Power-off request failed").count(), 2);
    assert!(!text.contains("Charge percent is below"));
    mock.done();
}

#[test]
fn charging_blocks_power_off() {
    // Charger connected while boosting: low charge is not acted upon.
    let mut expectations = init(0x30);
    expectations.extend([
        read(0x4F, 2),
        read(0x15, 0x4A),
        read(0x14, 0x00),
        read(0x15, 0x4A),
        read(0x16, 0xE2),
        read(0x18, 0x10),
        read(0x19, 0x2C),
        read(0x18, 0x10),
        read(0x17, 0x00),
    ]);
    expectations.extend(resync(0x30));
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    let power = FakePowerOff::new(true);
    let calls = power.calls.clone();
    // The line already sits low at start-up, so the first look is immediate.
    let edge = ScriptedEdge {
        waits: VecDeque::from([Ok(WaitOutcome::TimedOut)]),
        levels: VecDeque::from([Ok(true)]),
        cancel: cancel.clone(),
    };
    let mut monitor = Monitor::new(
        Sw6106::new(share(mock.clone())),
        Observation::Interrupt(edge),
        power,
        low_charge_config(),
        cancel,
    )
    .with_settle_delay(Duration::ZERO);

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert_eq!(calls.get(), 0);
    let text = normalise(&out);
    assert!(text.contains("Charge current: 0 mA"));
    assert!(!text.contains("Powering off"));
    mock.done();
}

#[test]
fn bus_failure_aborts_without_further_transactions() {
    let mut expectations = init(0x10);
    expectations.push(I2cTrans::write_read(ADDR, vec![0x4F], vec![0]).with_error(ErrorKind::Other));
    let mut mock = I2cMock::new(&expectations);
    let mut monitor = polling_monitor(
        &mock,
        FakePowerOff::new(true),
        low_charge_config(),
        CancellationToken::new(),
    );

    let mut out = Vec::new();
    let err = monitor.run(&mut out).unwrap_err();
    assert!(matches!(err, MonitorError::Device(Error::I2c(ErrorKind::Other))));
    assert_eq!(normalise(&out), "sw6106 chip version 6\n");
    mock.done();
}

#[test]
fn init_failure_is_fatal() {
    let expectations = [I2cTrans::write(ADDR, vec![0x09, 0x0F]).with_error(ErrorKind::Other)];
    let mut mock = I2cMock::new(&expectations);
    let mut monitor = polling_monitor(
        &mock,
        FakePowerOff::new(true),
        MonitorConfig::default(),
        CancellationToken::new(),
    );

    let mut out = Vec::new();
    assert!(matches!(monitor.run(&mut out), Err(MonitorError::Device(_))));
    assert!(out.is_empty());
    mock.done();
}

#[test]
fn cancelled_before_start_only_initialises() {
    let expectations = init(0x00);
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut monitor = polling_monitor(
        &mock,
        FakePowerOff::new(true),
        MonitorConfig::default(),
        cancel,
    );

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert_eq!(normalise(&out), "sw6106 chip version 6\n");
    mock.done();
}

#[test]
fn edges_trigger_reports_with_events() {
    let mut expectations = init(0x00);
    expectations.extend([
        // Edge: charge percent changed (bit 17, register 0x07 bit 1).
        read(0x08, 0x00),
        read(0x07, 0x02),
        write(0x07, 0x02),
        read(0x06, 0x00),
        read(0x05, 0x00),
        read(0x11, 0x00),
        read(0x4F, 80),
    ]);
    // The failed wait is swallowed and the loop resyncs as usual.
    expectations.extend(resync(0x00));
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    let edge = ScriptedEdge {
        waits: VecDeque::from([Ok(WaitOutcome::Edges(1)), Err("poll failed".to_string())]),
        levels: VecDeque::from([Ok(false)]),
        cancel: cancel.clone(),
    };
    let mut monitor = Monitor::new(
        Sw6106::new(share(mock.clone())),
        Observation::Interrupt(edge),
        FakePowerOff::new(true),
        MonitorConfig::default(),
        cancel,
    )
    .with_settle_delay(Duration::ZERO);

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert_eq!(
        normalise(&out),
        "sw6106 chip version 6\n\
         \n\
         -----\n\
         TIME\n\
         Status:\n\
         \tIdle\n\
         \n\
         Charge: 80%\n\
         Events:\n\
         \tCharge percent changed\n"
    );
    mock.done();
}

#[test]
fn unreadable_line_level_counts_as_active() {
    let mut expectations = init(0x00);
    expectations.push(read(0x4F, 42));
    expectations.extend(resync(0x00));
    let mut mock = I2cMock::new(&expectations);
    let cancel = CancellationToken::new();
    let edge = ScriptedEdge {
        waits: VecDeque::from([Ok(WaitOutcome::TimedOut)]),
        levels: VecDeque::from([Err("EIO".to_string())]),
        cancel: cancel.clone(),
    };
    let mut monitor = Monitor::new(
        Sw6106::new(share(mock.clone())),
        Observation::Interrupt(edge),
        FakePowerOff::new(true),
        MonitorConfig::default(),
        cancel,
    )
    .with_settle_delay(Duration::ZERO);

    let mut out = Vec::new();
    assert_eq!(monitor.run(&mut out).unwrap(), Exit::Cancelled);
    assert!(normalise(&out).contains("Charge: 42%"));
    mock.done();
}

#[test]
fn report_layout_lists_optional_lines_in_order() {
    let report = Report {
        time: "12:34:56".into(),
        status: SystemStatus::CHARGER_CONNECTED | SystemStatus::BOOST_CONVERTER_ENABLED,
        charge_percent: 50,
        battery_voltage_mv: Some(3_700),
        output_voltage_mv: Some(5_000),
        discharge_current_ma: Some(1_000),
        charge_current_ma: Some(2_000),
        events: Interrupts::CHARGER_ENABLED | Interrupts::BOOST_CONVERTER_ENABLED,
    };
    assert_eq!(
        report.to_string(),
        "\n-----\n12:34:56\nStatus:\n\
         \tCharger is connected\n\
         \tBoost converter is enabled\n\
         \n\
         Charge: 50%\n\
         Battery voltage: 3700 mV\n\
         Output voltage: 5000 mV\n\
         Discharge current: 1000 mA\n\
         Charge current: 2000 mA\n\
         Events:\n\
         \tBoost converter enabled\n\
         \tCharging enabled"
    );
}
