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

//! A symmetric, length-delimited, JSON-framed message channel over any `AsyncRead + AsyncWrite`.
//! Both control RPC (Master<->Node) and worker RPC (Master<->Worker) are multiplexed over one
//! TCP stream per peer using this primitive; each side just picks the message enum that models
//! its own protocol (see [`super::tcp`]).

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::MasterResult;

/// Spawns the background pump and hands back a send handle plus a receive stream for messages
/// of type `M`. Dropping the returned [`LinkHandle`] closes the underlying connection.
pub fn spawn_link<IO, M>(io: IO) -> (LinkHandle<M>, mpsc::Receiver<M>)
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
    M: Serialize + DeserializeOwned + Send + 'static,
{
    let framed = Framed::new(io, LengthDelimitedCodec::new());
    let (mut sink, mut stream) = framed.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(64);
    let (in_tx, in_rx) = mpsc::channel::<M>(64);

    tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if sink.send(bytes).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(_) => break,
            };
            let msg: M = match serde_json::from_slice(&frame) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed frame");
                    continue;
                }
            };
            if in_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    (
        LinkHandle {
            out_tx,
            _marker: PhantomData,
        },
        in_rx,
    )
}

#[derive(Clone)]
pub struct LinkHandle<M> {
    out_tx: mpsc::Sender<Bytes>,
    _marker: PhantomData<fn(M)>,
}

impl<M> LinkHandle<M>
where
    M: Serialize,
{
    pub async fn send(&self, msg: &M) -> MasterResult<()> {
        let mut buf = BytesMut::new();
        let encoded = serde_json::to_vec(msg).expect("message types are always serializable");
        buf.extend_from_slice(&encoded);
        self.out_tx
            .send(buf.freeze())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link closed").into())
    }
}
