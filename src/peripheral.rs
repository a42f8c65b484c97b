//! Binding of one device address to a shared bus.
//!
//! Several peripherals may sit on one adapter, so the bus is held as
//! `Rc<RefCell<_>>`; it stays open for as long as any binding exists. Transactions are
//! never issued concurrently, which keeps the `RefCell` borrow uncontended.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::i2c::I2c;

use crate::error::Error;

/// Bus shared between peripheral bindings.
pub type SharedBus<B> = Rc<RefCell<B>>;

/// Wrap a bus for sharing between bindings.
pub fn share<B>(bus: B) -> SharedBus<B> {
    Rc::new(RefCell::new(bus))
}

/// Byte-wide register access, the capability the chip driver is built on.
pub trait RegisterAccess {
    type Error;

    /// Read one register.
    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error>;

    /// Write one register.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;
}

/// A device address on a shared bus.
pub struct Peripheral<B> {
    bus: SharedBus<B>,
    address: u8,
}

impl<B> Peripheral<B> {
    /// Bind `address` on `bus`.
    pub fn new(bus: SharedBus<B>, address: u8) -> Self {
        Self { bus, address }
    }

    /// Return the 7-bit I2C address of this binding.
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<B> Peripheral<B>
where
    B: I2c,
{
    /// Send `selector ++ payload` in a single write transaction.
    pub fn write(&mut self, selector: &[u8], payload: &[u8]) -> Result<(), Error<B::Error>> {
        let mut frame = Vec::with_capacity(selector.len() + payload.len());
        frame.extend_from_slice(selector);
        frame.extend_from_slice(payload);
        self.bus
            .borrow_mut()
            .write(self.address, &frame)
            .map_err(Error::I2c)
    }

    /// Write `selector` and read `len` bytes back in one combined transaction.
    pub fn read(&mut self, selector: &[u8], len: usize) -> Result<Vec<u8>, Error<B::Error>> {
        let mut buf = vec![0u8; len];
        self.bus
            .borrow_mut()
            .write_read(self.address, selector, &mut buf)
            .map_err(Error::I2c)?;
        Ok(buf)
    }
}

impl<B> RegisterAccess for Peripheral<B>
where
    B: I2c,
{
    type Error = Error<B::Error>;

    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error> {
        let buf = self.read(&[reg], 1)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        self.write(&[reg], &[value])
    }
}
