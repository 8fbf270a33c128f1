// Copyright 2023 litep2p developers
// Copyright 2026 reachnet developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Join-state machine: tracks how far a node has gotten into the overlay,
//! from a cold start to being discoverable by others.

use crate::error::Error;

use parking_lot::RwLock;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    NotStarted,
    Bootstrapping,
    Connected,
    Discoverable,
    Failed,
}

impl JoinState {
    /// `Discoverable` is a super-state of `Connected`: both mean "ready".
    pub fn is_ready(&self) -> bool {
        matches!(self, JoinState::Connected | JoinState::Discoverable)
    }
}

/// Serializes join-state transitions and exposes a one-shot ready signal.
/// Transitions are unidirectional except the explicit `Failed -> Bootstrapping`
/// retry path.
pub struct JoinStateMachine {
    state: RwLock<JoinState>,
    ready_tx: watch::Sender<Option<Result<(), ()>>>,
    ready_rx: watch::Receiver<Option<Result<(), ()>>>,
}

impl JoinStateMachine {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(None);
        Self {
            state: RwLock::new(JoinState::NotStarted),
            ready_tx,
            ready_rx,
        }
    }

    pub fn state(&self) -> JoinState {
        *self.state.read()
    }

    pub fn start(&self) {
        let mut state = self.state.write();
        if *state == JoinState::NotStarted {
            *state = JoinState::Bootstrapping;
        }
    }

    /// First connection established while bootstrapping. A no-op once past
    /// `Bootstrapping` (transitions are unidirectional).
    pub fn on_connection_established(&self) {
        let mut state = self.state.write();
        if *state == JoinState::Bootstrapping {
            *state = JoinState::Connected;
            drop(state);
            let _ = self.ready_tx.send(Some(Ok(())));
        }
    }

    /// All configured bootstrap peers exhausted with zero connects and no
    /// mDNS-equivalent findings within the observation window.
    pub fn on_bootstrap_exhausted(&self) {
        let mut state = self.state.write();
        if *state == JoinState::Bootstrapping {
            *state = JoinState::Failed;
            drop(state);
            let _ = self.ready_tx.send(Some(Err(())));
        }
    }

    /// The discovery routing table grew to at least 3 entries and a DHT is
    /// present; promotes `Connected` to `Discoverable`.
    pub fn on_routing_table_grown(&self, size: usize, dht_present: bool) {
        let mut state = self.state.write();
        if *state == JoinState::Connected && dht_present && size >= 3 {
            *state = JoinState::Discoverable;
        }
    }

    pub fn retry_bootstrap(&self) {
        let mut state = self.state.write();
        if *state == JoinState::Failed {
            *state = JoinState::Bootstrapping;
            drop(state);
            let _ = self.ready_tx.send(None);
        }
    }

    /// Resolves once the node is ready (`Connected`/`Discoverable`) or has
    /// failed to bootstrap.
    pub async fn wait_ready(&self) -> crate::Result<()> {
        let mut rx = self.ready_rx.clone();
        loop {
            if let Some(result) = *rx.borrow() {
                return result.map_err(|_| Error::BootstrapFailed);
            }
            if rx.changed().await.is_err() {
                return Err(Error::BootstrapFailed);
            }
        }
    }
}

impl Default for JoinStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_moves_to_bootstrapping() {
        let machine = JoinStateMachine::new();
        machine.start();
        assert_eq!(machine.state(), JoinState::Bootstrapping);
    }

    #[test]
    fn start_is_a_no_op_once_bootstrapping() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_connection_established();
        machine.start();
        assert_eq!(machine.state(), JoinState::Connected);
    }

    #[tokio::test]
    async fn wait_ready_unblocks_on_first_connection() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_connection_established();
        machine.wait_ready().await.unwrap();
        assert!(machine.state().is_ready());
    }

    #[tokio::test]
    async fn wait_ready_reports_bootstrap_failure() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_bootstrap_exhausted();
        let err = machine.wait_ready().await.unwrap_err();
        assert!(matches!(err, Error::BootstrapFailed));
    }

    #[test]
    fn routing_table_growth_promotes_to_discoverable() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_connection_established();
        machine.on_routing_table_grown(3, true);
        assert_eq!(machine.state(), JoinState::Discoverable);
    }

    #[test]
    fn routing_table_growth_without_dht_does_not_promote() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_connection_established();
        machine.on_routing_table_grown(10, false);
        assert_eq!(machine.state(), JoinState::Connected);
    }

    #[test]
    fn retry_bootstrap_recovers_from_failure() {
        let machine = JoinStateMachine::new();
        machine.start();
        machine.on_bootstrap_exhausted();
        assert_eq!(machine.state(), JoinState::Failed);

        machine.retry_bootstrap();
        assert_eq!(machine.state(), JoinState::Bootstrapping);
    }
}
