//! Error definitions for the SW6106 driver.

/// Driver error. Register contents are never rejected, so the only failure is the
/// transport underneath.
#[derive(Debug)]
pub enum Error<I2cError> {
    /// Underlying I2C transaction failed.
    I2c(I2cError),
}

impl<I2cError: core::fmt::Display> core::fmt::Display for Error<I2cError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {e}"),
        }
    }
}

impl<I2cError: core::fmt::Debug + core::fmt::Display> std::error::Error for Error<I2cError> {}
