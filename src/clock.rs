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

//! An injectable notion of time, so the reconnect backoff sequence and the status refresh rate
//! limiter can be asserted against in unit tests without sleeping wall-clock seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Everything the coordinator needs from a clock: a Unix timestamp for persisted records, and a
/// cancellable delay for backoff and rate limiting.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now_unix(&self) -> u64;
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system clock and the Tokio timer wheel.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
