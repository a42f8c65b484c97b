//! Register map and constants for SW6106.
//! Addresses and ADC formulas come from the vendor I2C register map. The chip only
//! transfers one byte per transaction, so every multi-register value is assembled here
//! from independently read bytes.

/// Fixed 7-bit I2C address of the SW6106.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x3C;

/// Register addresses.
pub mod addr {
    /// First interrupt latch register (interrupt bits 0-7). Write 1 to clear.
    pub const INT_FIRST: u8 = 0x05;
    /// Last interrupt latch register (interrupt bits 24-31).
    pub const INT_LAST: u8 = 0x08;
    /// Global interrupt enable, one bit per interrupt category.
    pub const INT_GLOBAL_ENABLE: u8 = 0x09;
    /// First per-category interrupt mask register (interrupt bits 0-7).
    pub const INT_MASK_FIRST: u8 = 0x0A;
    /// Last per-category interrupt mask register (interrupt bits 24-31).
    pub const INT_MASK_LAST: u8 = 0x0D;
    /// System status (port presence, charger, boost converter).
    pub const SYSTEM_STATUS: u8 = 0x11;
    /// VBAT ADC bits [7:0].
    pub const ADC_VBAT: u8 = 0x14;
    /// VBAT ADC bits [11:8] in [3:0], VOUT ADC bits [11:8] in [7:4].
    pub const ADC_VBAT_VOUT: u8 = 0x15;
    /// VOUT ADC bits [7:0].
    pub const ADC_VOUT: u8 = 0x16;
    /// Charge current ADC bits [7:0].
    pub const ADC_ICHG: u8 = 0x17;
    /// Charge current ADC bits [11:8] in [3:0], discharge current bits [11:8] in [7:4].
    pub const ADC_ICHG_IDISCHG: u8 = 0x18;
    /// Discharge current ADC bits [7:0].
    pub const ADC_IDISCHG: u8 = 0x19;
    /// Chip version, reads 6 on known parts.
    pub const CHIP_VERSION: u8 = 0x26;
    /// Compensated battery charge, 0-100 %.
    pub const CHARGE_PERCENT: u8 = 0x4F;
}

bitflags::bitflags! {
    /// SYSTEM_STATUS register bits (0x11). None of the flags are mutually exclusive:
    /// the system may charge over type C while discharging over type A.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SystemStatus: u8 {
        const PORT_A_CONNECTED        = 1 << 0;
        const PORT_MICRO_CONNECTED    = 1 << 1;
        const PORT_C_CONNECTED        = 1 << 2;
        // Bit 3 reserved.
        const CHARGER_CONNECTED       = 1 << 4;
        /// Boost converter running, i.e. the battery is being discharged.
        const BOOST_CONVERTER_ENABLED = 1 << 5;
    }

    /// Interrupt set spanning the four latch registers 0x05-0x08 (and the four mask
    /// registers 0x0A-0x0D). Byte `n` of the value belongs to register `first + n`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interrupts: u32 {
        const SHORT_CIRCUIT              = 1 << 0;
        const IC_OVER_TEMPERATURE        = 1 << 1;
        // Bit 2 reserved.
        const BATTERY_OVER_TEMPERATURE   = 1 << 3;
        /// Enabled with the rest of its byte (0x0A = 0xFB); some vendor code masks it
        /// off by leaving 0x0A at 0xEB.
        const BATTERY_VOLTAGE_TOO_LOW    = 1 << 4;
        const CHARGE_TIMEOUT             = 1 << 5;
        const MICRO_USB_OVERVOLTAGE      = 1 << 6;
        const TYPE_C_OVERVOLTAGE         = 1 << 7;

        const BATTERY_VOLTAGE_TOO_HIGH   = 1 << 8;
        const PORT_A_CONNECTED           = 1 << 9;
        const PORT_A_DISCONNECTED        = 1 << 10;
        const PORT_MICRO_CONNECTED       = 1 << 11;
        const PORT_MICRO_DISCONNECTED    = 1 << 12;
        const PORT_C_CONNECTED           = 1 << 13;
        const PORT_C_DISCONNECTED        = 1 << 14;
        const SHORT_CONTROL_KEY_PRESS    = 1 << 15;

        const FAST_CHARGE_STATUS_CHANGED = 1 << 16;
        const CHARGE_PERCENT_CHANGED     = 1 << 17;
        const BOOST_CONVERTER_ENABLED    = 1 << 18;
        const BOOST_CONVERTER_DISABLED   = 1 << 19;
        const CHARGER_ENABLED            = 1 << 20;
        const CHARGER_DISABLED           = 1 << 21;
        const CHARGE_BELOW_5_PERCENT     = 1 << 22;
        // Bit 23 reserved.

        const FULLY_CHARGED              = 1 << 24;
        const WLED_STATE_CHANGED         = 1 << 25;
    }
}

/// VBAT LSB is 1.2 mV, expressed as a ratio so the result truncates like the datasheet table.
const VBAT_LSB_NUM: u32 = 6;
const VBAT_LSB_DEN: u32 = 5;
/// VOUT LSB in mV.
const VOUT_LSB_MV: u32 = 4;
/// Current LSB is 25/7 mA.
const CURRENT_LSB_NUM: u32 = 25;
const CURRENT_LSB_DEN: u32 = 7;

/// Join a low nibble of the shared register with a full low byte into a 12-bit code.
fn code_from_low_nibble(shared: u8, low: u8) -> u32 {
    (u32::from(shared & 0x0F) << 8) | u32::from(low)
}

/// Join a high nibble of the shared register with a full low byte into a 12-bit code.
fn code_from_high_nibble(shared: u8, low: u8) -> u32 {
    (u32::from(shared & 0xF0) << 4) | u32::from(low)
}

/// VBAT = ((0x15[3:0] << 8) | 0x14) * 1.2 mV, truncated.
pub fn battery_voltage_mv(vbat_vout: u8, vbat: u8) -> u16 {
    (code_from_low_nibble(vbat_vout, vbat) * VBAT_LSB_NUM / VBAT_LSB_DEN) as u16
}

/// VOUT = ((0x15[7:4] << 8) | 0x16) * 4 mV.
pub fn output_voltage_mv(vbat_vout: u8, vout: u8) -> u16 {
    (code_from_high_nibble(vbat_vout, vout) * VOUT_LSB_MV) as u16
}

/// ICHG = ((0x18[3:0] << 8) | 0x17) * 25 / 7 mA, truncated.
pub fn charge_current_ma(ichg_idischg: u8, ichg: u8) -> u16 {
    (code_from_low_nibble(ichg_idischg, ichg) * CURRENT_LSB_NUM / CURRENT_LSB_DEN) as u16
}

/// IDISCHG = ((0x18[7:4] << 8) | 0x19) * 25 / 7 mA, truncated.
pub fn discharge_current_ma(ichg_idischg: u8, idischg: u8) -> u16 {
    (code_from_high_nibble(ichg_idischg, idischg) * CURRENT_LSB_NUM / CURRENT_LSB_DEN) as u16
}
