use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::auth::{AuthOutcome, AuthWindow, Authenticator, PromptConfig};

/// Deferred operation held between the authentication request and its outcome.
pub type PendingAction = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    AwaitingChallenge,
    Executing,
}

/// Why a gated action did not run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Transient: the owner made an attempt that was rejected.
    #[error("Authentication failed")]
    Failed,
    /// Terminal: cancellation, lockout or an unavailable authenticator.
    #[error("Authentication error: {message}")]
    Error { code: i32, message: String },
    /// A newer request replaced this one before its challenge resolved.
    #[error("Request superseded by a newer one")]
    Superseded,
}

struct Pending {
    ticket: u64,
    action: PendingAction,
}

struct Slot {
    state: GateState,
    next_ticket: u64,
    pending: Option<Pending>,
}

/// Runs a caller-supplied action only after a fresh, successful authentication.
///
/// A single pending slot holds at most one action; a new request replaces it.
/// Every request carries a ticket and a challenge only ever executes the action
/// registered under its own ticket, so a challenge that resolves after its
/// action was replaced runs nothing.
pub struct AuthorizationGate<A: Authenticator> {
    authenticator: A,
    prompt: PromptConfig,
    window: Arc<AuthWindow>,
    slot: Mutex<Slot>,
}

impl<A: Authenticator> AuthorizationGate<A> {
    pub fn new(authenticator: A, prompt: PromptConfig, window: Arc<AuthWindow>) -> Self {
        Self {
            authenticator,
            prompt,
            window,
            slot: Mutex::new(Slot {
                state: GateState::Idle,
                next_ticket: 0,
                pending: None,
            }),
        }
    }

    pub fn state(&self) -> GateState {
        self.slot().state
    }

    pub fn prompt(&self) -> &PromptConfig {
        &self.prompt
    }

    /// Authentication proof stamped on every successful challenge.
    pub fn window(&self) -> &Arc<AuthWindow> {
        &self.window
    }

    /// Challenge the owner, then run `action` exactly once if and only if the
    /// challenge succeeds and no newer request replaced it in the meantime.
    #[instrument(skip_all, fields(authenticator = self.authenticator.name(), ticket = tracing::field::Empty))]
    pub async fn request<T, F>(&self, action: F) -> Result<T, GateError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, mut rx) = oneshot::channel();
        let ticket = self.arm(Box::new(move || {
            let _ = tx.send(action());
        }));
        tracing::Span::current().record("ticket", ticket);

        let mut armed = Armed {
            gate: self,
            ticket: Some(ticket),
        };
        let outcome = self.authenticator.challenge(&self.prompt).await;
        armed.ticket = None;
        self.resolve(ticket, outcome)?;

        // The sender is only dropped unsent when the action was discarded.
        rx.try_recv().map_err(|_| GateError::Superseded)
    }

    fn arm(&self, action: PendingAction) -> u64 {
        let mut slot = self.slot();
        slot.next_ticket += 1;
        let ticket = slot.next_ticket;
        if let Some(previous) = slot.pending.replace(Pending { ticket, action }) {
            debug!(superseded = previous.ticket, ticket, "pending action replaced");
        }
        if slot.state == GateState::Idle {
            slot.state = GateState::AwaitingChallenge;
        }
        debug!(ticket, "authentication challenge requested");
        ticket
    }

    /// Drop `ticket`'s action if it is still pending; used when its request is cancelled.
    fn abandon(&self, ticket: u64) {
        let mut slot = self.slot();
        if !slot.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            return;
        }
        let abandoned = slot.pending.take();
        if slot.state != GateState::Executing {
            let settled = settled_state(&slot);
            slot.state = settled;
        }
        drop(slot);
        drop(abandoned);
        debug!(ticket, "request cancelled before its challenge resolved; pending action discarded");
    }

    fn resolve(&self, ticket: u64, outcome: AuthOutcome) -> Result<(), GateError> {
        let mut slot = self.slot();
        let pending = match slot.pending.take() {
            Some(pending) if pending.ticket == ticket => pending,
            other => {
                slot.pending = other;
                debug!(ticket, ?outcome, "challenge resolved for a superseded request");
                return Err(GateError::Superseded);
            }
        };

        match outcome {
            AuthOutcome::Success => {
                slot.state = GateState::Executing;
                drop(slot);

                self.window.record();
                debug!(ticket, "authenticated; running pending action");
                (pending.action)();

                let mut slot = self.slot();
                let settled = settled_state(&slot);
                slot.state = settled;
                Ok(())
            }
            AuthOutcome::Failed => {
                let settled = settled_state(&slot);
                slot.state = settled;
                warn!(ticket, "authentication failed; pending action discarded");
                Err(GateError::Failed)
            }
            AuthOutcome::Error { code, message } => {
                let settled = settled_state(&slot);
                slot.state = settled;
                warn!(ticket, code, %message, "authentication error; pending action discarded");
                Err(GateError::Error { code, message })
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // Never held while an action runs, so poisoning cannot leave a half-updated slot.
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Live while a request awaits its challenge. Dropping it early (the request
/// future was cancelled) clears that request's pending action.
struct Armed<'g, A: Authenticator> {
    gate: &'g AuthorizationGate<A>,
    ticket: Option<u64>,
}

impl<A: Authenticator> Drop for Armed<'_, A> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket {
            self.gate.abandon(ticket);
        }
    }
}

fn settled_state(slot: &Slot) -> GateState {
    if slot.pending.is_some() {
        GateState::AwaitingChallenge
    } else {
        GateState::Idle
    }
}
