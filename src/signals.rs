#![forbid(unsafe_code)]

//! Readiness waiting and signal integration.
//!
//! The blocking variant of the editor parks in `pselect` with SIGINT,
//! SIGALRM and SIGWINCH blocked in the thread mask and atomically
//! unblocked for the duration of the wait. That closes the race where a
//! signal delivered between "check the cancel flag" and "start the wait"
//! would otherwise be missed until the next keystroke.
//!
//! SIGWINCH is observed through a `signal-hook` flag the engine samples
//! between keys; cancellation is an atomic flag settable from any thread
//! or signal context.

use std::io;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nix::sys::select::{pselect, FdSet};
use nix::sys::signal::{SigSet, Signal, SigmaskHow};
use nix::sys::time::TimeSpec;

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The descriptor has bytes to read.
    Ready,
    /// The deadline expired first.
    TimedOut,
    /// A signal interrupted the wait; the caller re-checks its flags.
    Interrupted,
}

/// Blocks SIGINT, SIGALRM and SIGWINCH for the current thread; restores
/// the previous mask on drop. The saved mask doubles as the mask applied
/// atomically while waiting.
#[derive(Debug)]
pub(crate) struct SignalMaskGuard {
    previous: SigSet,
}

impl SignalMaskGuard {
    pub(crate) fn block() -> io::Result<Self> {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGINT);
        blocked.add(Signal::SIGALRM);
        blocked.add(Signal::SIGWINCH);
        let previous = blocked
            .thread_swap_mask(SigmaskHow::SIG_BLOCK)
            .map_err(io::Error::from)?;
        Ok(Self { previous })
    }

    /// The pre-block mask, applied during waits so pending signals can
    /// interrupt them.
    pub(crate) fn wait_mask(&self) -> &SigSet {
        &self.previous
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        let _ = self.previous.thread_set_mask();
    }
}

/// Wait until `fd` is readable, the optional deadline passes, or a signal
/// arrives. `sigmask`, when given, is installed atomically for the wait.
pub(crate) fn wait_readable(
    fd: BorrowedFd<'_>,
    timeout: Option<Duration>,
    sigmask: Option<&SigSet>,
) -> io::Result<Readiness> {
    let mut read_fds = FdSet::new();
    read_fds.insert(fd);
    let timespec = timeout.map(TimeSpec::from_duration);

    match pselect(None, &mut read_fds, None, None, timespec.as_ref(), sigmask) {
        Ok(0) => Ok(Readiness::TimedOut),
        Ok(_) => Ok(Readiness::Ready),
        Err(nix::errno::Errno::EINTR) => Ok(Readiness::Interrupted),
        Err(err) => Err(io::Error::from(err)),
    }
}

/// The process-wide SIGWINCH observation flag, registered on first use.
pub(crate) fn winch_flag() -> &'static Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        // Registration only fails for forbidden signals; SIGWINCH is fine.
        let _ = signal_hook::flag::register(signal_hook::consts::SIGWINCH, Arc::clone(&flag));
        flag
    })
}

/// Consume (read and clear) the resize notification.
pub(crate) fn take_winch() -> bool {
    winch_flag().swap(false, Ordering::Relaxed)
}

/// Thread-safe, signal-safe cancellation for an in-progress edit.
///
/// Setting the flag makes the engine synthesize a Cancelled key before
/// its next read. Cloneable so it can be handed to signal handlers and
/// other threads.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation of the edit in progress.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume the request, clearing the flag.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}
