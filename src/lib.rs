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

//! The coordinator kernel of a distributed task-execution cluster's Master: node discovery and
//! connection management, node/worker admission and pairing, the task queue and scheduler,
//! result/failure routing, and status aggregation.
//!
//! [`coordinator::Coordinator`] is the single value that owns every piece of mutable state; its
//! methods are split across modules by the critical section they touch ([`registry`] vs.
//! [`queue`] vs. [`status`]), matching the lock layout in the design notes. The store, transports,
//! discovery source and clock are all dependency-injected so the coordinator is testable without
//! real sockets, a real database, or real wall-clock time — see the `tests/` directory for the
//! end-to-end scenarios this enables.

pub mod admission;
pub mod clock;
pub mod config;
pub mod conn;
pub mod coordinator;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod model;
pub mod queue;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod status;
pub mod store;

pub use coordinator::Coordinator;
pub use error::{MasterError, MasterResult};
