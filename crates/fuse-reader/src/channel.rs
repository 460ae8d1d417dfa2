//! Deadline-bounded queue hand-offs that still notice cancellation promptly.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::CancelScope;

/// Upper bound on how long a blocked hand-off goes without checking for
/// cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// The deadline passed before the hand-off completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Elapsed;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Sent {
    Delivered,
    Cancelled,
    Disconnected,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Received<T> {
    Value(T),
    Cancelled,
    Disconnected,
}

pub(crate) fn send_within<T>(
    tx: &Sender<T>,
    mut value: T,
    deadline: Duration,
    cancel: &CancelScope,
) -> Result<Sent, Elapsed> {
    let started = Instant::now();
    loop {
        let slice = deadline.saturating_sub(started.elapsed()).min(CANCEL_POLL);
        match tx.send_timeout(value, slice) {
            Ok(()) => return Ok(Sent::Delivered),
            Err(SendTimeoutError::Disconnected(_)) => return Ok(Sent::Disconnected),
            Err(SendTimeoutError::Timeout(back)) => {
                if cancel.is_cancelled() {
                    return Ok(Sent::Cancelled);
                }
                if started.elapsed() >= deadline {
                    return Err(Elapsed);
                }
                value = back;
            }
        }
    }
}

pub(crate) fn recv_within<T>(
    rx: &Receiver<T>,
    deadline: Duration,
    cancel: &CancelScope,
) -> Result<Received<T>, Elapsed> {
    let started = Instant::now();
    loop {
        let slice = deadline.saturating_sub(started.elapsed()).min(CANCEL_POLL);
        match rx.recv_timeout(slice) {
            Ok(value) => return Ok(Received::Value(value)),
            Err(RecvTimeoutError::Disconnected) => return Ok(Received::Disconnected),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    return Ok(Received::Cancelled);
                }
                if started.elapsed() >= deadline {
                    return Err(Elapsed);
                }
            }
        }
    }
}
