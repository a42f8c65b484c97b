//! SW6106 driver.
//! Typed accessors over the register map. Nothing is cached: each call issues fresh
//! single-byte transactions, so a 12-bit ADC value assembled from two registers may tear
//! if the chip updates between the two reads.

use tracing::trace;

use crate::data_types::InterruptCategory;
use crate::peripheral::{Peripheral, RegisterAccess, SharedBus};
use crate::registers::{
    addr, battery_voltage_mv, charge_current_ma, discharge_current_ma, output_voltage_mv,
    Interrupts, SystemStatus, DEFAULT_I2C_ADDRESS,
};

/// SW6106 driver, composed over a register access capability.
pub struct Sw6106<R> {
    regs: R,
}

impl<B> Sw6106<Peripheral<B>> {
    /// Create a driver bound to the default I2C address (0x3C) on a shared bus.
    pub fn new(bus: SharedBus<B>) -> Self {
        Self::with_address(bus, DEFAULT_I2C_ADDRESS)
    }

    /// Create a driver bound to a custom I2C address.
    pub fn with_address(bus: SharedBus<B>, address: u8) -> Self {
        Self::from_registers(Peripheral::new(bus, address))
    }
}

impl<R> Sw6106<R> {
    /// Create a driver over any register access implementation.
    pub fn from_registers(regs: R) -> Self {
        Self { regs }
    }

    /// Release the register access capability.
    pub fn free(self) -> R {
        self.regs
    }
}

impl<R> Sw6106<R>
where
    R: RegisterAccess,
{
    /// Enable exactly the interrupts in `requested`.
    ///
    /// Category `c` is enabled in the global register when `requested` has any bit in
    /// its byte. The mask registers receive `requested` little-endian, so bit 0 lands in
    /// the lowest mask register.
    pub fn enable_interrupts(&mut self, requested: Interrupts) -> Result<(), R::Error> {
        let global = InterruptCategory::ALL
            .into_iter()
            .filter(|category| requested.intersects(category.mask()))
            .fold(0u8, |acc, category| acc | category.global_enable_bit());
        self.regs.write_register(addr::INT_GLOBAL_ENABLE, global)?;

        let bytes = requested.bits().to_le_bytes();
        for category in InterruptCategory::ALL {
            let value = bytes[usize::from(category.index())];
            self.regs.write_register(category.mask_register(), value)?;
        }
        trace!(requested = requested.bits(), global, "interrupts enabled");
        Ok(())
    }

    /// Read and acknowledge pending interrupts.
    ///
    /// Latches are read from the highest category down, shifting each byte in from the
    /// right, so the lowest latch register ends up in bits 0-7. Any non-zero latch is
    /// written back unchanged, which clears exactly the bits that were read.
    pub fn read_interrupts(&mut self) -> Result<Interrupts, R::Error> {
        let mut raw = 0u32;
        for category in InterruptCategory::ALL.into_iter().rev() {
            let reg = category.latch_register();
            let value = self.regs.read_register(reg)?;
            if value != 0 {
                self.regs.write_register(reg, value)?;
            }
            raw = (raw << 8) | u32::from(value);
        }

        let pending = Interrupts::from_bits_retain(raw);
        for (name, flag) in pending.iter_names() {
            trace!(flag = name, category = ?InterruptCategory::of(flag), "interrupt pending");
        }
        Ok(pending)
    }

    /// Read SYSTEM_STATUS. Reserved bits are dropped.
    pub fn get_system_status(&mut self) -> Result<SystemStatus, R::Error> {
        let val = self.regs.read_register(addr::SYSTEM_STATUS)?;
        Ok(SystemStatus::from_bits_truncate(val))
    }

    /// Read the chip version register. Known parts report 6.
    pub fn get_chip_version(&mut self) -> Result<u8, R::Error> {
        self.regs.read_register(addr::CHIP_VERSION)
    }

    /// Read the compensated charge percent. Nominally 0-100; passed through unchecked.
    pub fn get_charge_percent(&mut self) -> Result<u8, R::Error> {
        self.regs.read_register(addr::CHARGE_PERCENT)
    }

    /// Battery voltage in mV. Reads 0 while the system is idle.
    pub fn get_battery_voltage_mv(&mut self) -> Result<u16, R::Error> {
        let shared = self.regs.read_register(addr::ADC_VBAT_VOUT)?;
        let low = self.regs.read_register(addr::ADC_VBAT)?;
        Ok(battery_voltage_mv(shared, low))
    }

    /// Output voltage in mV.
    pub fn get_output_voltage_mv(&mut self) -> Result<u16, R::Error> {
        let shared = self.regs.read_register(addr::ADC_VBAT_VOUT)?;
        let low = self.regs.read_register(addr::ADC_VOUT)?;
        Ok(output_voltage_mv(shared, low))
    }

    /// Charge current in mA.
    pub fn get_charge_current_ma(&mut self) -> Result<u16, R::Error> {
        let shared = self.regs.read_register(addr::ADC_ICHG_IDISCHG)?;
        let low = self.regs.read_register(addr::ADC_ICHG)?;
        Ok(charge_current_ma(shared, low))
    }

    /// Discharge current in mA.
    pub fn get_discharge_current_ma(&mut self) -> Result<u16, R::Error> {
        let shared = self.regs.read_register(addr::ADC_ICHG_IDISCHG)?;
        let low = self.regs.read_register(addr::ADC_IDISCHG)?;
        Ok(discharge_current_ma(shared, low))
    }
}
