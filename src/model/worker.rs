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

/// A single execution slot on a node, identified by `host:port:index` with
/// `index in [0, node.cores)`. A worker is, at any instant, in exactly one of the idle pool, the
/// working map, or absent (disconnected) — never more than one.
pub type WorkerKey = String;

pub fn worker_key(host: &str, port: u16, index: u32) -> WorkerKey {
    format!("{host}:{port}:{index}")
}
