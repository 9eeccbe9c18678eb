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

//! Process bootstrap for the Master: parses CLI/config, wires the coordinator up to real TCP
//! listeners, and spawns its background loops. Everything interesting lives in the library crate;
//! this binary is deliberately thin, matching the spec's treatment of the admin gateway, TLS
//! termination and mDNS discovery as collaborators the core is dependency-injected with rather
//! than implements.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cluster_master::clock::TokioClock;
use cluster_master::config::{load_config, MasterOpts};
use cluster_master::conn::TcpNodeDialer;
use cluster_master::coordinator::Coordinator;
use cluster_master::crypto::MasterKeypair;
use cluster_master::discovery::ChannelDiscovery;
use cluster_master::rpc::tcp::TcpWorkerTransport;
use cluster_master::rpc::{WorkerCallback, WorkerHello};
use cluster_master::store::MemStore;
use tokio::net::TcpListener;

mod admin;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = MasterOpts::parse();
    let config = load_config(&opts.config_path);

    let worker_addr: SocketAddr = opts.worker_listen_addr.parse()?;
    let admin_addr: SocketAddr = opts.admin_listen_addr.parse()?;

    let keypair = MasterKeypair::generate()?;
    // The durable node/task-instance database is an external collaborator (§1); `MemStore` is
    // the non-distributed stand-in the spec calls for, not a production backend.
    let store = Arc::new(MemStore::new());

    let coordinator = Coordinator::new(
        store,
        keypair,
        config,
        TokioClock,
        Arc::new(TcpNodeDialer),
        worker_addr.ip().to_string(),
        worker_addr.port(),
    );

    // A real mDNS browser is out of scope (§1); this channel is the production-shaped seam it
    // would feed. With nothing wired to the sender, discovery is a no-op until one is.
    let (_discovery_tx, discovery_source) = ChannelDiscovery::new(16);
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_discovery_loop(discovery_source).await });
    }

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            loop {
                coordinator.fetch_task_status().await;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
    }

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.connect().await });
    }

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(err) = run_worker_listener(worker_addr, coordinator).await {
                tracing::error!(error = %err, "worker listener exited");
            }
        });
    }

    admin::run_admin_listener(admin_addr, coordinator).await
}

/// Accepts worker connections, authenticates each against the credential the Master registered
/// at node admission time, and hands it off to [`Coordinator::on_worker_connected`].
async fn run_worker_listener(addr: SocketAddr, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "worker listener bound");

    loop {
        let (stream, peer) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_worker_connection(stream, coordinator).await {
                tracing::debug!(%peer, error = %err, "worker connection ended");
            }
        });
    }
}

async fn handle_worker_connection(
    stream: tokio::net::TcpStream,
    coordinator: Arc<Coordinator>,
) -> anyhow::Result<()> {
    let (transport, mut callbacks, hello_rx) = TcpWorkerTransport::new(stream);
    let WorkerHello { worker_key, secret } =
        tokio::time::timeout(Duration::from_secs(10), hello_rx).await??;

    if !coordinator.authenticate_worker(&worker_key, &secret).await {
        anyhow::bail!("worker {worker_key} presented an unknown or mismatched credential");
    }

    let transport = Arc::new(transport);
    coordinator
        .on_worker_connected(worker_key.clone(), transport.clone())
        .await;

    while let Some(callback) = callbacks.recv().await {
        match callback {
            WorkerCallback::SendResults { worker_key, results, workunit_key } => {
                coordinator.send_results(worker_key, results, workunit_key).await;
            }
            WorkerCallback::TaskFailed { worker_key, results, workunit_key } => {
                coordinator.task_failed(worker_key, results, workunit_key).await;
            }
            WorkerCallback::WorkerStopped { worker_key } => {
                coordinator.worker_stopped(worker_key).await;
            }
            WorkerCallback::RequestWorker { worker_key, subtask_key, args, workunit_key } => {
                if let Err(err) = coordinator
                    .request_worker(worker_key, subtask_key, args, workunit_key)
                    .await
                {
                    tracing::debug!(error = %err, "request_worker rejected");
                }
            }
        }
    }

    coordinator.on_worker_disconnected(worker_key).await;
    Ok(())
}
