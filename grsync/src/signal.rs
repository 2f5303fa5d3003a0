//! SIGINT/SIGTERM handling.
//!
//! The first two signals ask the pipeline to stop after the current file.
//! The third exits immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use grsync_core::StopHandle;
use tracing::warn;

/// Signals received so far.
static RECEIVED: AtomicUsize = AtomicUsize::new(0);

const FORCE_AFTER: usize = 3;
const POLL: Duration = Duration::from_millis(100);

/// Install the handlers and a watcher thread forwarding them to `stop`.
pub fn install(stop: StopHandle) {
    #[cfg(unix)]
    {
        // Safety: the handler only touches an atomic and calls `_exit`, both
        // async-signal-safe.
        unsafe {
            libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
            libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        }
    }

    let spawned = thread::Builder::new()
        .name("grsync-signal".into())
        .spawn(move || watch(stop));
    if let Err(e) = spawned {
        warn!("signal watcher unavailable, stop requests will be ignored: {e}");
    }
}

fn watch(stop: StopHandle) {
    let mut seen = 0;
    loop {
        let n = RECEIVED.load(Ordering::SeqCst);
        if n > seen {
            seen = n;
            stop.request_stop();
            warn!(
                "Stop requested ({n}/{FORCE_AFTER}); finishing the current file. \
                 Signal {} more time(s) to exit immediately.",
                FORCE_AFTER.saturating_sub(n)
            );
        }
        thread::sleep(POLL);
    }
}

#[cfg(unix)]
extern "C" fn on_signal(_sig: libc::c_int) {
    let n = RECEIVED.fetch_add(1, Ordering::SeqCst) + 1;
    if n >= FORCE_AFTER {
        // No ledger close here: every commit is already durable in the WAL,
        // and the next open replays it. An upload in flight stays incomplete
        // on the service until `abort-uploads` removes it.
        unsafe { libc::_exit(130) };
    }
}
