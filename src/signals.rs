//! Termination signals.

use std::io;
use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use crate::monitor::CancellationToken;

/// Spawn a thread that cancels `token` on SIGINT, SIGQUIT or SIGTERM.
///
/// Once registered, these signals no longer terminate the process on their own; the
/// monitor stops at its next iteration boundary instead.
pub fn spawn_listener(token: CancellationToken) -> io::Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGQUIT, SIGTERM])?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                info!(signal, "caught signal; stopping");
                token.cancel();
            }
        })
}
