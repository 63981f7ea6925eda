use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    process,
};

thread_local! {
    // Number of `recover_exit` calls active on this thread.
    static EXITERS: Cell<i32> = const { Cell::new(0) };
}

/// The panic payload used for an `Exit` line when [`recover_exit`] is
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequested;

/// Whether an `Exit` line written on this thread unwinds to a
/// [`recover_exit`] instead of ending the process. A panic only unwinds its
/// own thread, so wrappers on other threads do not count.
pub(crate) fn unwinds_on_exit() -> bool {
    EXITERS.with(|n| 0 < n.get())
}

pub(crate) fn exit_after_line() -> ! {
    if !unwinds_on_exit() {
        process::exit(1);
    }
    // Skips the panic hook; there is nothing to report beyond the line.
    panic::resume_unwind(Box::new(ExitRequested))
}

/// Runs `body` so that an `Exit` line written inside it unwinds back to
/// here instead of ending the process on the spot, letting `Drop` cleanup
/// run first.
///
/// `on_exit` gets the exit status (initially 1) and may change it. The
/// process then exits with that status, unless it is negative in which case
/// `None` is returned (useful in tests). Other panics keep unwinding.
///
/// ```
/// let ran = lager::recover_exit(
///     || lager::exit().mmap("Can't start", lager::map!()),
///     |status| *status = -1,
/// );
/// assert_eq!(None, ran);
/// ```
pub fn recover_exit<R>(body: impl FnOnce() -> R, on_exit: impl FnOnce(&mut i32)) -> Option<R> {
    EXITERS.with(|n| n.set(n.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(body));
    EXITERS.with(|n| n.set(n.get() - 1));
    match result {
        Ok(value) => Some(value),
        Err(payload) if payload.is::<ExitRequested>() => {
            let mut status = 1;
            on_exit(&mut status);
            if 0 <= status {
                process::exit(status);
            }
            None
        }
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Like [`recover_exit`] but always exits with status 1 after an `Exit`
/// line.
pub fn exit_via_panic<R>(body: impl FnOnce() -> R) -> R {
    recover_exit(body, |_| {}).unwrap_or_else(|| process::exit(1))
}
