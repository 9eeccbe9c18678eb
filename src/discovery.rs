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

//! Zero-config discovery as an external collaborator: the coordinator only ever sees
//! `(host, port)` candidates arriving over a channel. A real mDNS responder/browser is out of
//! scope; [`ChannelDiscovery`] is the production-shaped adapter any such browser would feed, and
//! is also what the test suite drives directly.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::error::MasterResult;
use crate::model::Node;

/// A candidate cluster member surfaced by discovery, before it has ever been dialed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub host: String,
    pub port: u16,
}

/// Yields discovery candidates one at a time. Implementations are expected to run their own
/// background task (e.g. an mDNS browser) and push onto an internal channel; [`ChannelDiscovery`]
/// is the minimal implementation of that shape.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync + 'static {
    async fn next(&mut self) -> Option<DiscoveredNode>;
}

/// A [`DiscoverySource`] backed by an mpsc channel. Production code would spawn a task that
/// resolves mDNS browse events into `DiscoveredNode`s and sends them here; tests send candidates
/// directly.
pub struct ChannelDiscovery {
    rx: mpsc::Receiver<DiscoveredNode>,
}

impl ChannelDiscovery {
    pub fn new(buffer: usize) -> (mpsc::Sender<DiscoveredNode>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait::async_trait]
impl DiscoverySource for ChannelDiscovery {
    async fn next(&mut self) -> Option<DiscoveredNode> {
        self.rx.recv().await
    }
}

impl<C: Clock> Coordinator<C> {
    /// Drains a [`DiscoverySource`] for the coordinator's lifetime, handling each candidate as it
    /// arrives. Intended to be spawned as its own background task by the bootstrap binary.
    pub async fn run_discovery_loop(self: &Arc<Self>, mut source: impl DiscoverySource) {
        while let Some(candidate) = source.next().await {
            self.handle_discovered(candidate).await;
        }
    }

    /// Applies the `multicast_all` policy (§6) to one discovered candidate: register-and-dial
    /// immediately, or just remember it for [`Self::promote_known_node`].
    pub async fn handle_discovered(self: &Arc<Self>, candidate: DiscoveredNode) {
        if self.config.multicast_all {
            if let Err(err) = self.register_node(candidate.host, candidate.port).await {
                tracing::error!(error = %err, "failed to register a discovered node");
                return;
            }
            self.connect().await;
        } else {
            self.registry
                .write()
                .await
                .known_nodes
                .insert((candidate.host, candidate.port));
        }
    }

    /// Admin-driven promotion of an endpoint discovery already surfaced but did not auto-register
    /// (because `multicast_all` is off). Returns `false` if `(host, port)` was never discovered.
    pub async fn promote_known_node(self: &Arc<Self>, host: String, port: u16) -> MasterResult<bool> {
        let present = self.registry.write().await.known_nodes.remove(&(host.clone(), port));
        if !present {
            return Ok(false);
        }
        self.register_node(host, port).await?;
        self.connect().await;
        Ok(true)
    }

    async fn register_node(&self, host: String, port: u16) -> MasterResult<()> {
        let existing = self.store.list_nodes().await?;
        if existing.iter().any(|n| n.host == host && n.port == port) {
            return Ok(());
        }
        let id = self.store.next_node_id().await?;
        self.store.put_node(Node::new(id, host, port)).await
    }
}
