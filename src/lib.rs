//! SW6106 power-bank SoC driver and battery monitor.
//!
//! Layers, bottom up: [`bus`] frames transactions on a Linux I2C adapter,
//! [`peripheral`] binds the chip address on a shared bus, [`driver`] decodes the
//! register map, and [`monitor`] runs the observation loop and the low-charge
//! shutdown policy.

pub mod bus;
pub mod config;
pub mod data_types;
pub mod driver;
pub mod error;
pub mod gpio;
pub mod monitor;
pub mod peripheral;
pub mod power;
pub mod registers;
pub mod signals;

pub use driver::Sw6106;
pub use error::Error;
pub use registers::DEFAULT_I2C_ADDRESS;
