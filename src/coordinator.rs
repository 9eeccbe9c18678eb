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

//! The coordinator kernel. One `Coordinator` value owns every piece of mutable state described in
//! [`crate::registry`], [`crate::queue`] and [`crate::status`]; the store, transports and clock
//! are all dependency-injected through the constructor rather than reached for globally, the same
//! shape as the teacher's environment-struct pattern.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::clock::{Clock, TokioClock};
use crate::config::MasterConfig;
use crate::conn::NodeDialer;
use crate::crypto::MasterKeypair;
use crate::queue::QueueCore;
use crate::registry::RegistryCore;
use crate::status::StatusState;
use crate::store::Store;

/// Owns every piece of coordinator state. Cheaply `Arc`-wrapped by the bootstrap binary so that
/// background tasks (reconnect timers, the discovery loop, the status ticker, per-connection
/// listener loops) can each hold a clone and call back into it.
pub struct Coordinator<C: Clock = TokioClock> {
    pub(crate) store: Arc<dyn Store>,
    /// The registry lock (`lock` in the design doc): worker pools, credentials, connection
    /// handles, and the reconnect gate. Acquired before `queue`, never after.
    pub(crate) registry: RwLock<RegistryCore>,
    /// The queue lock: pending FIFO and running set.
    pub(crate) queue: Mutex<QueueCore>,
    pub(crate) status: Mutex<StatusState>,
    pub(crate) keypair: MasterKeypair,
    pub(crate) config: MasterConfig,
    pub(crate) clock: C,
    /// How the connection manager dials a newly-known node's control endpoint.
    pub(crate) dialer: Arc<dyn NodeDialer>,
    /// The address nodes are told to dial back to when the Master issues `init`.
    pub(crate) master_host: String,
    pub(crate) master_port: u16,
}

impl<C: Clock> Coordinator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        keypair: MasterKeypair,
        config: MasterConfig,
        clock: C,
        dialer: Arc<dyn NodeDialer>,
        master_host: String,
        master_port: u16,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry: RwLock::new(RegistryCore::default()),
            queue: Mutex::new(QueueCore::default()),
            status: Mutex::new(StatusState::default()),
            keypair,
            config,
            clock,
            dialer,
            master_host,
            master_port,
        })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }
}
