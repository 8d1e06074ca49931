//! Zero-capacity rendezvous between one producer and any number of consumers.
//!
//! An offer completes only once a consumer has taken the value; an offer that
//! is cancelled or closed before that is retracted and the value handed back,
//! so nothing is ever delivered by an operation that reports failure.
//!
//! The same slot carries payloads inside a pipe half and freshly accepted
//! connections from a listener to its dialers.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::lifecycle::scope::{first_done, first_err};
use crate::lifecycle::{Scope, ScopeError};

/// Close progress of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// Closed while an offer is still waiting in the slot.
    Closing,
    /// Closed and empty; consumers observe end-of-stream.
    Closed,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    state: State,
}

/// Why an offer did not complete. The value is handed back untouched.
#[derive(Debug)]
pub(crate) enum Refused<T> {
    Closed(T),
    Cancelled(ScopeError, T),
}

impl<T> Refused<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Refused::Closed(value) | Refused::Cancelled(_, value) => value,
        }
    }
}

/// Retracts a placed value if the offering future is dropped before it settles.
struct PendingOffer<'a, T> {
    handoff: &'a Handoff<T>,
    settled: bool,
}

impl<T> Drop for PendingOffer<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            drop(self.handoff.retract());
        }
    }
}

#[derive(Debug)]
pub(crate) struct Handoff<T> {
    slot: Mutex<Slot<T>>,
    /// Serializes producers so offers never interleave.
    turn: tokio::sync::Mutex<()>,
    offered: Notify,
    taken: Notify,
}

impl<T> Handoff<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                state: State::Open,
            }),
            turn: tokio::sync::Mutex::new(()),
            offered: Notify::new(),
            taken: Notify::new(),
        }
    }

    /// Offer `value` and wait until a consumer takes it.
    pub(crate) async fn offer(&self, value: T, scopes: &[&Scope]) -> Result<(), Refused<T>> {
        let _turn = tokio::select! {
            biased;
            err = first_done(scopes) => return Err(Refused::Cancelled(err, value)),
            turn = self.turn.lock() => turn,
        };
        if let Some(err) = first_err(scopes) {
            return Err(Refused::Cancelled(err, value));
        }

        let placed = self.place(value);
        if let Err(value) = placed {
            return Err(Refused::Closed(value));
        }
        let mut pending = PendingOffer {
            handoff: self,
            settled: false,
        };
        self.offered.notify_waiters();

        let outcome = tokio::select! {
            biased;
            err = first_done(scopes) => match self.retract() {
                Some(value) => Err(Refused::Cancelled(err, value)),
                // taken in the same instant the scope fired: the value is
                // delivered, so the offer counts as complete
                None => Ok(()),
            },
            taken = self.wait_taken() => taken.map_err(Refused::Closed),
        };
        pending.settled = true;
        outcome
    }

    /// Take the next offered value; `None` once the slot is closed and empty.
    pub(crate) async fn take(&self, scopes: &[&Scope]) -> Result<Option<T>, ScopeError> {
        loop {
            let notified = self.offered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = self.try_take();
            if let Some(taken) = ready {
                return Ok(taken);
            }

            tokio::select! {
                biased;
                err = first_done(scopes) => return Err(err),
                _ = &mut notified => {}
            }
        }
    }

    /// Close the slot. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        let closed_now = {
            let mut slot = self.slot.lock();
            match slot.state {
                State::Open => {
                    slot.state = if slot.value.is_some() {
                        State::Closing
                    } else {
                        State::Closed
                    };
                    true
                }
                State::Closing | State::Closed => false,
            }
        };
        if closed_now {
            self.offered.notify_waiters();
            self.taken.notify_waiters();
        }
        closed_now
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slot.lock().state != State::Open
    }

    /// Closed with nothing left to take.
    pub(crate) fn is_drained(&self) -> bool {
        self.slot.lock().state == State::Closed
    }

    fn place(&self, value: T) -> Result<(), T> {
        let mut slot = self.slot.lock();
        if slot.state != State::Open {
            return Err(value);
        }
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        Ok(())
    }

    fn retract(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        let value = slot.value.take();
        if value.is_some() && slot.state == State::Closing {
            slot.state = State::Closed;
        }
        value
    }

    fn try_take(&self) -> Option<Option<T>> {
        let taken = {
            let mut slot = self.slot.lock();
            match slot.value.take() {
                Some(value) => {
                    if slot.state == State::Closing {
                        slot.state = State::Closed;
                    }
                    Some(Some(value))
                }
                None if slot.state == State::Closed => Some(None),
                None => None,
            }
        };
        if matches!(taken, Some(Some(_))) {
            self.taken.notify_waiters();
        }
        taken
    }

    async fn wait_taken(&self) -> Result<(), T> {
        loop {
            let notified = self.taken.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let status = {
                let mut slot = self.slot.lock();
                match (slot.value.is_some(), slot.state) {
                    (false, _) => Some(Ok(())),
                    (true, State::Closing) => {
                        slot.state = State::Closed;
                        slot.value.take().map(Err)
                    }
                    (true, _) => None,
                }
            };
            if let Some(status) = status {
                return status;
            }
            notified.await;
        }
    }
}
