//! Handshake gate: one per connection, `Pending` until the upgrade is
//! accepted.
//!
//! The gate has two halves. [`HandshakeGate`] is owned by the connection's
//! I/O task, which is the only place the state changes. [`HandshakeSignal`]
//! is handed to whoever wants to send application traffic and resolves
//! exactly once: with success, with the failure that stopped the
//! handshake, or with a failure if the gate is dropped while still
//! pending. It never hangs past its timeout.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::AckwireError;

/// Where a connection is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Complete,
    /// Terminal. A failed gate never becomes `Complete`.
    Failed,
}

/// The state-owning half of the gate.
#[derive(Debug)]
pub struct HandshakeGate {
    state: GateState,
    notify: Option<oneshot::Sender<Result<(), AckwireError>>>,
}

impl HandshakeGate {
    /// Creates a pending gate and the signal that observes it.
    pub fn new() -> (Self, HandshakeSignal) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            state: GateState::Pending,
            notify: Some(tx),
        };
        (gate, HandshakeSignal { rx })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == GateState::Complete
    }

    /// `Pending → Complete`. Any other starting state is a violation.
    pub fn complete(&mut self) -> Result<(), AckwireError> {
        match self.state {
            GateState::Pending => {
                self.state = GateState::Complete;
                if let Some(tx) = self.notify.take() {
                    // Nobody waiting is fine (the server never waits).
                    let _ = tx.send(Ok(()));
                }
                Ok(())
            }
            GateState::Complete => Err(AckwireError::Handshake(
                "handshake response received after the handshake completed".into(),
            )),
            GateState::Failed => Err(AckwireError::Handshake(
                "handshake already failed".into(),
            )),
        }
    }

    /// `Pending → Failed`, delivering `err` to the signal.
    ///
    /// Returns `false` (and drops `err`) if the gate was not pending.
    pub fn fail(&mut self, err: AckwireError) -> bool {
        if self.state != GateState::Pending {
            return false;
        }
        self.state = GateState::Failed;
        if let Some(tx) = self.notify.take() {
            let _ = tx.send(Err(err));
        }
        true
    }
}

/// The waiting half of the gate.
#[derive(Debug)]
pub struct HandshakeSignal {
    rx: oneshot::Receiver<Result<(), AckwireError>>,
}

impl HandshakeSignal {
    /// Used when the caller doesn't pick a timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Waits for the handshake outcome, for at most `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<(), AckwireError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AckwireError::Handshake(
                "connection closed before the handshake completed".into(),
            )),
            Err(_) => Err(AckwireError::Handshake(format!(
                "no handshake response within {timeout:?}"
            ))),
        }
    }
}
