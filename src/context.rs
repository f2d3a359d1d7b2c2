//! Cancellable execution context with an optional deadline.
//!
//! Each request carries exactly one context. If the context has a deadline,
//! that deadline is the sole timeout authority for the request; the
//! client-level timeout is disabled so the two can never race. Waits inside
//! the engine (most importantly the retry sleep) are a select between the
//! timer and cancellation, so a cancel is observed without sleeping through
//! it.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::ContextErrorKind;

#[derive(Debug)]
struct Shared {
    canceled: Mutex<bool>,
    signal: Condvar,
    deadline: Option<Instant>,
}

/// Cheaply cloneable handle; clones observe the same cancellation state.
#[derive(Debug, Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

/// Cancels its [`Context`]. Dropping the handle does nothing; cancellation
/// is always explicit.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let mut canceled = self.shared.canceled.lock().unwrap();
        *canceled = true;
        self.shared.signal.notify_all();
    }
}

impl Context {
    fn with_deadline_opt(deadline: Option<Instant>) -> (Context, CancelHandle) {
        let shared = Arc::new(Shared {
            canceled: Mutex::new(false),
            signal: Condvar::new(),
            deadline,
        });
        (Context { shared: shared.clone() }, CancelHandle { shared })
    }

    /// A context that never cancels and has no deadline.
    pub fn background() -> Context {
        Context::with_deadline_opt(None).0
    }

    pub fn with_cancel() -> (Context, CancelHandle) {
        Context::with_deadline_opt(None)
    }

    pub fn with_deadline(deadline: Instant) -> (Context, CancelHandle) {
        Context::with_deadline_opt(Some(deadline))
    }

    pub fn with_timeout(timeout: Duration) -> (Context, CancelHandle) {
        Context::with_deadline_opt(Some(Instant::now() + timeout))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    /// Time left until the deadline. `None` when no deadline is set; a zero
    /// duration when it already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.shared
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_canceled(&self) -> bool {
        *self.shared.canceled.lock().unwrap()
    }

    /// The terminal state, if the context has one. Cancellation wins over an
    /// elapsed deadline, matching the order callers trigger them in.
    pub fn error(&self) -> Option<ContextErrorKind> {
        if self.is_canceled() {
            return Some(ContextErrorKind::Canceled);
        }
        match self.shared.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(ContextErrorKind::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// Sleep for `duration`, waking immediately on cancellation and never
    /// past the deadline.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextErrorKind> {
        if let Some(kind) = self.error() {
            return Err(kind);
        }
        let wake = Instant::now() + duration;
        let wait_until = match self.shared.deadline {
            Some(deadline) => wake.min(deadline),
            None => wake,
        };

        let mut canceled = self.shared.canceled.lock().unwrap();
        loop {
            if *canceled {
                return Err(ContextErrorKind::Canceled);
            }
            let now = Instant::now();
            if now >= wait_until {
                break;
            }
            let (guard, _timed_out) = self
                .shared
                .signal
                .wait_timeout(canceled, wait_until - now)
                .unwrap();
            canceled = guard;
        }
        drop(canceled);

        match self.error() {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn background_never_errors() {
        let ctx = Context::background();
        assert_eq!(ctx.error(), None);
        assert!(ctx.deadline().is_none());
        ctx.sleep(Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn cancel_is_observed() {
        let (ctx, cancel) = Context::with_cancel();
        assert_eq!(ctx.error(), None);
        cancel.cancel();
        assert_eq!(ctx.error(), Some(ContextErrorKind::Canceled));
    }

    #[test]
    fn deadline_elapses() {
        let (ctx, _cancel) = Context::with_timeout(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ctx.error(), Some(ContextErrorKind::DeadlineExceeded));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let (ctx, cancel) = Context::with_cancel();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10));
        assert_eq!(result, Err(ContextErrorKind::Canceled));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let (ctx, _cancel) = Context::with_timeout(Duration::from_millis(30));
        let result = ctx.sleep(Duration::from_secs(10));
        assert_eq!(result, Err(ContextErrorKind::DeadlineExceeded));
    }

    #[test]
    fn short_sleep_before_deadline_succeeds() {
        let (ctx, _cancel) = Context::with_timeout(Duration::from_secs(10));
        ctx.sleep(Duration::from_millis(5)).unwrap();
        assert_eq!(ctx.error(), None);
    }
}
