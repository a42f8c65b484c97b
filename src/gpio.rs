//! Edge input used to wake the monitor when the SW6106 pulls its IRQ line low.
//!
//! [`GpioLine`] talks to the Linux GPIO character device (v1 ABI) directly.

use std::ffi::c_char;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Result of a bounded edge wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// At least one edge arrived; the count of queued edge events.
    Edges(usize),
    /// Nothing happened before the timeout.
    TimedOut,
}

/// Blocking edge-triggered digital input.
pub trait EdgeInput {
    type Error: core::fmt::Display;

    /// Block until an edge arrives or `timeout` elapses.
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<WaitOutcome, Self::Error>;

    /// Whether the line currently sits at its active level.
    fn is_active(&mut self) -> Result<bool, Self::Error>;
}

/// `GPIO_GET_LINEEVENT_IOCTL`: _IOWR(0xB4, 0x04, struct gpioevent_request).
const GPIO_GET_LINEEVENT_IOCTL: libc::c_ulong = 0xC030_B404;
/// `GPIOHANDLE_GET_LINE_VALUES_IOCTL`: _IOWR(0xB4, 0x08, struct gpiohandle_data).
const GPIOHANDLE_GET_LINE_VALUES_IOCTL: libc::c_ulong = 0xC040_B408;

const GPIOHANDLE_REQUEST_INPUT: u32 = 1 << 0;
const GPIOHANDLE_REQUEST_BIAS_PULL_UP: u32 = 1 << 5;
const GPIOEVENT_REQUEST_FALLING_EDGE: u32 = 1 << 1;

const GPIO_MAX_NAME_SIZE: usize = 32;
const GPIOHANDLES_MAX: usize = 64;

/// Events drained per wakeup.
const MAX_EVENTS_PER_READ: usize = 16;

/// `struct gpioevent_request`.
#[repr(C)]
struct GpioEventRequest {
    lineoffset: u32,
    handleflags: u32,
    eventflags: u32,
    consumer_label: [c_char; GPIO_MAX_NAME_SIZE],
    fd: libc::c_int,
}

/// `struct gpiohandle_data`.
#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

/// `struct gpioevent_data`. Only its size matters here.
#[allow(dead_code)]
#[repr(C)]
struct GpioEventData {
    timestamp: u64,
    id: u32,
}

const EVENT_SIZE: usize = size_of::<GpioEventData>();

/// Errors raised by the GPIO character device.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The chip device could not be opened.
    #[error("failed to open GPIO chip {}: {source}", path.display())]
    Open {
        /// Chip path
        path: PathBuf,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// The line could not be requested for edge events.
    #[error("failed to request line {line} for edge events: {source}")]
    Request {
        /// Line offset
        line: u32,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// Polling, reading events or reading the level failed.
    #[error("GPIO line I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Resolve a chip given as a path, a `gpiochipN` name or a bare number.
pub fn chip_path(chip: &str) -> PathBuf {
    if chip.contains('/') {
        PathBuf::from(chip)
    } else if chip.bytes().all(|b| b.is_ascii_digit()) {
        PathBuf::from(format!("/dev/gpiochip{chip}"))
    } else {
        PathBuf::from(format!("/dev/{chip}"))
    }
}

/// A GPIO line requested for falling-edge events with pull-up bias. Active level is low.
#[derive(Debug)]
pub struct GpioLine {
    events: File,
}

impl GpioLine {
    /// Request `line` on `chip` for falling-edge events.
    pub fn request_falling_edge(chip: &str, line: u32, consumer: &str) -> Result<Self, GpioError> {
        let path = chip_path(chip);
        let chip_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| GpioError::Open {
                path: path.clone(),
                source,
            })?;

        let mut request = GpioEventRequest {
            lineoffset: line,
            handleflags: GPIOHANDLE_REQUEST_INPUT | GPIOHANDLE_REQUEST_BIAS_PULL_UP,
            eventflags: GPIOEVENT_REQUEST_FALLING_EDGE,
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            fd: -1,
        };
        // Keep the trailing NUL.
        for (dst, src) in request
            .consumer_label
            .iter_mut()
            .zip(consumer.bytes().take(GPIO_MAX_NAME_SIZE - 1))
        {
            *dst = src as c_char;
        }

        // SAFETY: GPIO_GET_LINEEVENT_IOCTL reads and writes one gpioevent_request; the
        // struct is repr(C) with the kernel layout and lives for the whole call. On
        // success the kernel stores a new event fd in `request.fd`.
        let ret = unsafe {
            libc::ioctl(
                chip_file.as_raw_fd(),
                GPIO_GET_LINEEVENT_IOCTL as _,
                &raw mut request,
            )
        };
        if ret < 0 || request.fd < 0 {
            return Err(GpioError::Request {
                line,
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: the fd was just returned by the kernel and is owned by nobody else.
        let events = File::from(unsafe { OwnedFd::from_raw_fd(request.fd) });
        debug!(chip = %path.display(), line, "requested GPIO line for falling edges");
        Ok(Self { events })
    }
}

impl EdgeInput for GpioLine {
    type Error = GpioError;

    fn wait_for_edge(&mut self, timeout: Duration) -> Result<WaitOutcome, GpioError> {
        let mut pollfd = libc::pollfd {
            fd: self.events.as_raw_fd(),
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        // SAFETY: one valid pollfd, borrowed for the duration of the call.
        let ret = unsafe { libc::poll(&raw mut pollfd, 1, timeout_ms) };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if ret == 0 {
            return Ok(WaitOutcome::TimedOut);
        }

        let mut buf = [0u8; EVENT_SIZE * MAX_EVENTS_PER_READ];
        let n = self.events.read(&mut buf)?;
        Ok(WaitOutcome::Edges(n / EVENT_SIZE))
    }

    fn is_active(&mut self) -> Result<bool, GpioError> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };

        // SAFETY: GPIOHANDLE_GET_LINE_VALUES_IOCTL fills one gpiohandle_data, which is
        // repr(C) and outlives the call. Event fds accept this request.
        let ret = unsafe {
            libc::ioctl(
                self.events.as_raw_fd(),
                GPIOHANDLE_GET_LINE_VALUES_IOCTL as _,
                &raw mut data,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(data.values[0] == 0)
    }
}
