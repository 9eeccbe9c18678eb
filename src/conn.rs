// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The connection manager: owns per-node connection state and drives reconnection with
//! exponential backoff under the single `connecting` gate held in [`crate::registry::RegistryCore`].
//! `connect()`/`schedule_reconnect()` are the only places that touch `attempt` and
//! `reconnect_timer`, so the backoff sequence in [`crate::config::MasterConfig`] is reproduced
//! exactly regardless of how many nodes or callers are involved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::model::{Node, NodeId};
use crate::rpc::NodeTransport;

/// Per-node connection lifecycle, independent of *pairing* (tracked on the `Node` record's
/// `pub_key`). `Ready` is reached only once the node has replied to `init`; any transport loss
/// from any state returns to `Disconnected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Authenticated,
    Ready,
}

/// Dials a node's control endpoint. Production code backs this with
/// [`crate::rpc::tcp::TcpNodeTransport::connect`]; tests substitute an in-memory fake so the
/// connection manager's retry/backoff logic is exercised without real sockets.
#[async_trait]
pub trait NodeDialer: Send + Sync + 'static {
    async fn dial(&self, host: &str, port: u16) -> crate::error::MasterResult<Arc<dyn NodeTransport>>;
}

/// [`NodeDialer`] backed by a real TCP connection.
pub struct TcpNodeDialer;

#[async_trait]
impl NodeDialer for TcpNodeDialer {
    async fn dial(&self, host: &str, port: u16) -> crate::error::MasterResult<Arc<dyn NodeTransport>> {
        let transport = crate::rpc::tcp::TcpNodeTransport::connect(host, port).await?;
        Ok(Arc::new(transport))
    }
}

impl<C: Clock> Coordinator<C> {
    /// Walks every known node without a live connection handle and dials it. Only one `connect()`
    /// pass runs at a time: a concurrent caller that finds `connecting` already set returns
    /// immediately having done nothing, and is not itself a failure.
    pub async fn connect(self: &Arc<Self>) {
        {
            let mut registry_guard = self.registry.write().await;
            if registry_guard.connecting {
                return;
            }
            registry_guard.connecting = true;
        }

        let nodes = match self.store.list_nodes().await {
            Ok(nodes) => nodes,
            Err(err) => {
                tracing::error!(error = %err, "failed to list nodes for a connect pass");
                self.registry.write().await.connecting = false;
                return;
            }
        };

        let mut saw_failure = false;
        for node in nodes {
            if self.registry.read().await.node_handles.contains_key(&node.id) {
                continue;
            }
            saw_failure |= !self.connect_one(node).await;
        }

        {
            let mut registry_guard = self.registry.write().await;
            registry_guard.connecting = false;
            if !saw_failure {
                registry_guard.attempt = 0;
            }
        }

        if saw_failure {
            // Consecutive failures within (and across) connect passes grow the backoff; this is
            // *not* a "new" loss event, so the attempt counter is not reset here (see
            // `on_connection_lost` for that case, and P4/P5 for the distinction this preserves).
            self.schedule_reconnect(false).await;
        }
    }

    /// Dial, log in, and hand off to [`crate::admission::Coordinator::on_connected`] for a single
    /// node. Returns `true` on success (including a node that later fails admission for a non-
    /// transport reason, e.g. a duplicate key — that is fatal to the node, not retryable), `false`
    /// for anything that should be retried under backoff.
    async fn connect_one(self: &Arc<Self>, node: Node) -> bool {
        let transport = match self.dialer.dial(&node.host, node.port).await {
            Ok(transport) => transport,
            Err(err) => {
                tracing::debug!(node_id = node.id, error = %err, "dial failed, will retry under backoff");
                return false;
            }
        };

        match transport.login("master".to_string(), "master".to_string()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(node_id = node.id, "node rejected the placeholder login, will retry");
                return false;
            }
            Err(err) => {
                tracing::debug!(node_id = node.id, error = %err, "login call failed, will retry under backoff");
                return false;
            }
        }

        self.registry.write().await.conn_states.insert(node.id, ConnState::Authenticated);

        match self.on_connected(node.clone(), transport.clone()).await {
            Ok(admitted) => {
                // `on_connected` already registered the live handle under the global lock before
                // issuing `init`; only the connection-manager's own state needs updating here.
                self.registry.write().await.conn_states.insert(admitted.id, ConnState::Ready);
                true
            }
            Err(err) if err.is_transport() => {
                tracing::debug!(node_id = node.id, error = %err, "admission hit a transport error, will retry");
                self.registry.write().await.conn_states.insert(node.id, ConnState::Disconnected);
                false
            }
            Err(err) => {
                // Duplicate key or crypto mismatch: fatal for this node, not retryable. Admission
                // itself already deleted the node record where that applies (duplicate key).
                tracing::warn!(node_id = node.id, error = %err, "node admission failed fatally, dropping connection");
                self.registry.write().await.conn_states.remove(&node.id);
                true
            }
        }
    }

    /// A previously-`Ready` node's transport dropped. This is always a *new* failure: any pending
    /// reconnect timer is replaced with a fresh one at the base delay (P5), distinct from the
    /// growing backoff `connect()` itself drives while repeatedly failing to dial.
    pub async fn on_connection_lost(self: &Arc<Self>, node_id: NodeId) {
        {
            let mut registry_guard = self.registry.write().await;
            registry_guard.node_handles.remove(&node_id);
            registry_guard.conn_states.insert(node_id, ConnState::Disconnected);
        }
        self.schedule_reconnect(true).await;
    }

    /// Schedules a single future `connect()` after `base * 2^min(attempt, max_exp)` seconds.
    /// `reset=true` zeroes the attempt counter before computing the delay (a fresh failure starts
    /// the sequence over at the base delay); `reset=false` uses whatever the counter already is
    /// (a continuing run of failures grows the delay). Either way, any existing pending timer is
    /// cancelled first — cancelling an already-fired timer is a harmless no-op — so at most one
    /// timer is ever pending (I5/P9's sibling guarantee for the reconnect gate itself).
    pub async fn schedule_reconnect(self: &Arc<Self>, reset: bool) {
        let delay_secs = {
            let mut registry_guard = self.registry.write().await;
            if let Some(handle) = registry_guard.reconnect_timer.take() {
                handle.abort();
            }
            if reset {
                registry_guard.attempt = 0;
            }
            let exp = registry_guard.attempt.min(self.config.reconnect_max_exp);
            let delay_secs = self.config.reconnect_base_secs * 2u64.pow(exp);
            registry_guard.attempt += 1;
            delay_secs
        };

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.clock.sleep(Duration::from_secs(delay_secs)).await;
            this.connect().await;
        });
        self.registry.write().await.reconnect_timer = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_matches_the_documented_caps() {
        // 5 * 2^min(n, 6): 5, 10, 20, 40, 80, 160, 320, 320, ...
        let base: u64 = 5;
        let max_exp: u32 = 6;
        let expected = [5u64, 10, 20, 40, 80, 160, 320, 320, 320];
        for (attempt, want) in expected.into_iter().enumerate() {
            let exp = (attempt as u32).min(max_exp);
            assert_eq!(base * 2u64.pow(exp), want, "attempt {attempt}");
        }
    }
}
