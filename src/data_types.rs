//! Data types for the SW6106 driver: interrupt categories and printable descriptions
//! of the status and interrupt bitflags.

use core::fmt;

use crate::registers::{addr, Interrupts, SystemStatus};

/// Interrupt category. Each category owns one byte of [`Interrupts`], one mask
/// register and one bit of the global interrupt enable register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InterruptCategory {
    /// Bits 0-7: protection and fault events.
    Protection,
    /// Bits 8-15: port plug/unplug and key events.
    Ports,
    /// Bits 16-23: charger, boost converter and charge level changes.
    PowerPath,
    /// Bits 24-31: full charge and WLED events.
    Indicators,
}

impl InterruptCategory {
    /// All categories in register order.
    pub const ALL: [InterruptCategory; 4] = [
        InterruptCategory::Protection,
        InterruptCategory::Ports,
        InterruptCategory::PowerPath,
        InterruptCategory::Indicators,
    ];

    /// Position of the category, equal to its global enable bit.
    pub fn index(self) -> u8 {
        match self {
            InterruptCategory::Protection => 0,
            InterruptCategory::Ports => 1,
            InterruptCategory::PowerPath => 2,
            InterruptCategory::Indicators => 3,
        }
    }

    /// Every bit position the category spans, named or reserved.
    pub fn mask(self) -> Interrupts {
        Interrupts::from_bits_retain(0xFF << (8 * u32::from(self.index())))
    }

    /// Bit of the global interrupt enable register (0x09) gating this category.
    pub fn global_enable_bit(self) -> u8 {
        1 << self.index()
    }

    /// Interrupt mask register holding this category's enable bits.
    pub fn mask_register(self) -> u8 {
        addr::INT_MASK_FIRST + self.index()
    }

    /// Interrupt latch register holding this category's pending bits.
    pub fn latch_register(self) -> u8 {
        addr::INT_FIRST + self.index()
    }

    /// Category owning a single interrupt flag. Returns `None` for empty or
    /// multi-category sets.
    pub fn of(flag: Interrupts) -> Option<InterruptCategory> {
        if flag.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|category| category.mask().contains(flag))
    }
}

/// Human readable descriptions of the system status flags.
pub const STATUS_DESCRIPTIONS: [(SystemStatus, &str); 5] = [
    (SystemStatus::PORT_A_CONNECTED, "USB type A port is connected"),
    (SystemStatus::PORT_MICRO_CONNECTED, "Micro USB port is connected"),
    (SystemStatus::PORT_C_CONNECTED, "USB type C port is connected"),
    (SystemStatus::CHARGER_CONNECTED, "Charger is connected"),
    (SystemStatus::BOOST_CONVERTER_ENABLED, "Boost converter is enabled"),
];

/// Human readable descriptions of every named interrupt, in bit order.
pub const INTERRUPT_DESCRIPTIONS: [(Interrupts, &str); 24] = [
    (Interrupts::SHORT_CIRCUIT, "Short circuit protection triggered"),
    (
        Interrupts::IC_OVER_TEMPERATURE,
        "Integrated circuit overtemperature protection triggered",
    ),
    (
        Interrupts::BATTERY_OVER_TEMPERATURE,
        "Battery overtemperature protection triggered",
    ),
    (Interrupts::BATTERY_VOLTAGE_TOO_LOW, "Battery voltage is too low"),
    (Interrupts::CHARGE_TIMEOUT, "Battery charging is taking too long"),
    (Interrupts::MICRO_USB_OVERVOLTAGE, "Voltage on Micro USB port is too high"),
    (Interrupts::TYPE_C_OVERVOLTAGE, "Voltage on Type C port is too high"),
    (Interrupts::BATTERY_VOLTAGE_TOO_HIGH, "Battery voltage is too high"),
    (Interrupts::PORT_A_CONNECTED, "USB type A port is connected"),
    (Interrupts::PORT_A_DISCONNECTED, "USB type A port is disconnected"),
    (Interrupts::PORT_MICRO_CONNECTED, "Micro USB port is connected"),
    (Interrupts::PORT_MICRO_DISCONNECTED, "Micro USB port is disconnected"),
    (Interrupts::PORT_C_CONNECTED, "USB type C port is connected"),
    (Interrupts::PORT_C_DISCONNECTED, "USB type C port is disconnected"),
    (Interrupts::SHORT_CONTROL_KEY_PRESS, "Control key has been pressed shortly"),
    (Interrupts::FAST_CHARGE_STATUS_CHANGED, "Fast charge status changed"),
    (Interrupts::CHARGE_PERCENT_CHANGED, "Charge percent changed"),
    (Interrupts::BOOST_CONVERTER_ENABLED, "Boost converter enabled"),
    (Interrupts::BOOST_CONVERTER_DISABLED, "Boost converter disabled"),
    (Interrupts::CHARGER_ENABLED, "Charging enabled"),
    (Interrupts::CHARGER_DISABLED, "Charging disabled"),
    (Interrupts::CHARGE_BELOW_5_PERCENT, "Charge level is below 5 percent"),
    (Interrupts::FULLY_CHARGED, "Battery is fully charged"),
    (Interrupts::WLED_STATE_CHANGED, "WLED state changed"),
];

/// Write one tab-indented line per described flag contained in `value`.
fn write_descriptions<F>(f: &mut fmt::Formatter<'_>, value: F, table: &[(F, &str)]) -> fmt::Result
where
    F: bitflags::Flags + Copy,
{
    let mut first = true;
    for (flag, description) in table {
        if value.contains(*flag) {
            if !first {
                f.write_str("\n")?;
            }
            write!(f, "\t{description}")?;
            first = false;
        }
    }
    Ok(())
}

impl SystemStatus {
    /// A charger is plugged in.
    pub fn is_charging(&self) -> bool {
        self.contains(SystemStatus::CHARGER_CONNECTED)
    }

    /// The boost converter is feeding an output from the battery.
    pub fn is_discharging(&self) -> bool {
        self.contains(SystemStatus::BOOST_CONVERTER_ENABLED)
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("\tIdle");
        }
        write_descriptions(f, *self, &STATUS_DESCRIPTIONS)
    }
}

impl fmt::Display for Interrupts {
    /// Reserved bits have no description and are not printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_descriptions(f, *self, &INTERRUPT_DESCRIPTIONS)
    }
}
