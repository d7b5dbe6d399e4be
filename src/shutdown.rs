//! Ctrl-C / SIGTERM handling
//!
//! The signal handler only raises a flag. A watcher thread polls the flag
//! and runs the shutdown callback outside signal context, so the callback
//! may do anything (close the window, stop the audio thread).

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::constants::SIGNAL_POLL_INTERVAL;

static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
const HANDLED_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the shutdown flag
#[cfg(unix)]
pub fn install_signal_handlers() -> io::Result<()> {
    for signal in HANDLED_SIGNALS {
        // SAFETY: `on_signal` only stores to an atomic, which is
        // async-signal-safe; the handler is a plain `extern "C" fn`.
        let previous = unsafe {
            libc::signal(
                signal,
                on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
            )
        };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers() -> io::Result<()> {
    tracing::debug!("Signal handling not available on this platform");
    Ok(())
}

/// Put the default dispositions back so a second Ctrl-C terminates at once
#[cfg(unix)]
fn restore_default_handlers() {
    for signal in HANDLED_SIGNALS {
        // SAFETY: resetting to SIG_DFL passes no pointers.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
}

#[cfg(not(unix))]
fn restore_default_handlers() {}

/// Whether SIGINT or SIGTERM has arrived since the handlers were installed
pub fn shutdown_requested() -> bool {
    SIGNALLED.load(Ordering::SeqCst)
}

/// Run `on_shutdown` once `requested` reports true, polling every `interval`
pub fn spawn_watcher<R, F>(requested: R, interval: Duration, on_shutdown: F) -> io::Result<JoinHandle<()>>
where
    R: Fn() -> bool + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("shutdown-watcher".into())
        .spawn(move || {
            while !requested() {
                thread::sleep(interval);
            }
            on_shutdown();
        })
}

/// Install the signal handlers and call `on_shutdown` on the first signal
pub fn spawn_signal_watcher<F>(on_shutdown: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    install_signal_handlers()?;
    spawn_watcher(shutdown_requested, SIGNAL_POLL_INTERVAL, move || {
        tracing::info!("Shutdown signal received");
        restore_default_handlers();
        on_shutdown();
    })
}
