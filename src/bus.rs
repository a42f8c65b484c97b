//! Linux I2C adapter (`/dev/i2c-N`) driven through the `I2C_RDWR` ioctl.
//!
//! Every call issues exactly one framed transaction: a write, or a register pointer
//! write followed by a repeated-start read. Failures are returned immediately; there is
//! no retry.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use thiserror::Error;
use tracing::{debug, trace};

/// `I2C_RDWR` ioctl request number (linux/i2c-dev.h).
const I2C_RDWR: libc::c_ulong = 0x0707;
/// Message is a read (linux/i2c.h).
const I2C_M_RD: u16 = 0x0001;
/// Continue the previous message without a (repeated) start condition.
const I2C_M_NOSTART: u16 = 0x4000;

/// `struct i2c_msg`.
#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// `struct i2c_rdwr_ioctl_data`.
#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// Errors raised by the bus adapter.
#[derive(Debug, Error)]
pub enum BusError {
    /// The adapter file could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Adapter path
        path: PathBuf,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// The kernel rejected the transaction.
    #[error("transaction with device 0x{address:02x} failed: {source}")]
    Transfer {
        /// 7-bit device address
        address: u8,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// A single message exceeds what `struct i2c_msg` can describe.
    #[error("message of {len} bytes is too long for one transaction")]
    MessageTooLong {
        /// Requested length
        len: usize,
    },
}

impl embedded_hal::i2c::Error for BusError {
    fn kind(&self) -> ErrorKind {
        let source = match self {
            BusError::Transfer { source, .. } => source,
            _ => return ErrorKind::Other,
        };
        match source.raw_os_error() {
            Some(libc::ENXIO) | Some(libc::EREMOTEIO) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            Some(libc::EAGAIN) => ErrorKind::ArbitrationLoss,
            _ => ErrorKind::Other,
        }
    }
}

/// An open bus adapter. Exclusive owner of the file descriptor, which is closed on drop.
#[derive(Debug)]
pub struct I2cBus {
    file: File,
}

impl I2cBus {
    /// Open the adapter read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| BusError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "opened I2C adapter");
        Ok(Self { file })
    }

    fn transfer(&mut self, address: u8, msgs: &mut [I2cMsg]) -> Result<(), BusError> {
        let mut data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            // Truncation safe: callers build at most a handful of messages
            nmsgs: msgs.len() as u32,
        };

        // SAFETY: I2C_RDWR reads `nmsgs` i2c_msg structs from `msgs`; each `buf` points
        // to a live buffer of at least `len` bytes borrowed from the caller's operations
        // for the duration of this call, and read buffers are uniquely borrowed.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &raw mut data) };
        if ret < 0 {
            let source = io::Error::last_os_error();
            debug!(address, error = %source, "I2C_RDWR failed");
            return Err(BusError::Transfer { address, source });
        }
        Ok(())
    }
}

impl ErrorType for I2cBus {
    type Error = BusError;
}

impl I2c for I2cBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut msgs = Vec::with_capacity(operations.len());
        let mut previous_read = None;
        for operation in operations.iter_mut() {
            let (read, len, buf) = match operation {
                Operation::Read(buf) => (true, buf.len(), buf.as_mut_ptr()),
                Operation::Write(bytes) => (false, bytes.len(), bytes.as_ptr().cast_mut()),
            };
            let len = u16::try_from(len).map_err(|_| BusError::MessageTooLong { len })?;

            let mut flags = if read { I2C_M_RD } else { 0 };
            // Adjacent operations of the same direction continue without a restart.
            if previous_read == Some(read) {
                flags |= I2C_M_NOSTART;
            }
            previous_read = Some(read);

            msgs.push(I2cMsg {
                addr: u16::from(address),
                flags,
                len,
                buf,
            });
        }

        trace!(address, messages = msgs.len(), "I2C transaction");
        self.transfer(address, &mut msgs)
    }
}
