//! Pipeline / transaction executor (spec.md §4.5, component C5).
//!
//! Grounded on `lunatic-redis::connection::ConnectionLike::req_packed_commands`
//! for the "encode everything, flush once, read N replies in order" shape,
//! and on `glide-core::client::standalone_client::StandaloneClient::send_request`'s
//! disconnect handling for the failure path. The single-flight FIFO
//! `inflight` queue with `tokio::sync::oneshot` waiters is new: the teacher
//! is synchronous and has no concurrent-flush queue to borrow.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use crate::connection::SharedConnection;
use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::executor::Executor;
use crate::resp::{self, Value};

#[derive(Clone)]
struct Command {
    name: String,
    args: Vec<Vec<u8>>,
}

struct InflightEntry {
    batch: Vec<Command>,
    waiter: oneshot::Sender<RedisResult<Vec<Value>>>,
}

struct State {
    pending: Vec<Command>,
    inflight: VecDeque<InflightEntry>,
}

/// Buffers commands client-side; `flush()` issues the buffered batch as a
/// single ordered write/read, optionally wrapped in `MULTI`/`EXEC` for
/// transaction mode (spec.md §3 `Pipeline queue`, `tx` flag).
pub struct PipelineExecutor {
    connection: SharedConnection,
    state: Mutex<State>,
    tx_mode: bool,
}

impl PipelineExecutor {
    pub fn new(connection: SharedConnection, tx_mode: bool) -> Self {
        PipelineExecutor {
            connection,
            state: Mutex::new(State {
                pending: Vec::new(),
                inflight: VecDeque::new(),
            }),
            tx_mode,
        }
    }

    /// Queues a command without touching the network; the real reply
    /// arrives via the result list a later `flush()` resolves to (spec.md
    /// §4.5: "its `sendCommand` returns an immediately-resolved sentinel").
    fn enqueue(&self, name: &str, args: Vec<Vec<u8>>) {
        // `state` is only ever held briefly here, never across an await
        // point, so a blocking lock would do too; `try_lock` keeps this
        // function synchronous for callers that just want to queue.
        let mut state = self
            .state
            .try_lock()
            .expect("pipeline state is never held across an await point during enqueue");
        state.pending.push(Command {
            name: name.to_string(),
            args,
        });
    }

    /// Snapshots `pending`, wraps it in `MULTI`/`EXEC` for transaction
    /// mode, and either drives the dispatch loop itself (if this flush is
    /// the only entry in `inflight`) or waits for an earlier flush to
    /// reach it. Concurrent `flush()` calls resolve in enqueue order
    /// (spec.md §4.5 "Concurrency").
    pub async fn flush(&self) -> RedisResult<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        let is_head = {
            let mut state = self.state.lock().await;
            let batch = std::mem::take(&mut state.pending);
            state.inflight.push_back(InflightEntry { batch, waiter: tx });
            state.inflight.len() == 1
        };

        if is_head {
            self.drain().await;
        }

        rx.await
            .unwrap_or_else(|_| Err(RedisError::from_kind(ErrorKind::ConnectionClosed)))
    }

    /// Processes `inflight` head-first until the queue drains. Only the
    /// `flush()` call that finds itself alone in the queue runs this —
    /// every other caller just waits on its oneshot (spec.md §4.5 step 3).
    async fn drain(&self) {
        loop {
            let batch = {
                let state = self.state.lock().await;
                match state.inflight.front() {
                    Some(entry) => entry.batch.clone(),
                    None => break,
                }
            };

            let result = self.dispatch(&batch).await;

            let mut state = self.state.lock().await;
            if let Some(entry) = state.inflight.pop_front() {
                let _ = entry.waiter.send(result);
            }
            if state.inflight.is_empty() {
                break;
            }
        }
    }

    async fn dispatch(&self, batch: &[Command]) -> RedisResult<Vec<Value>> {
        let mut encoded = Vec::new();
        let frame_count = if self.tx_mode { batch.len() + 2 } else { batch.len() };

        if self.tx_mode {
            resp::encode_command(&mut encoded, "MULTI", std::iter::empty());
        }
        for cmd in batch {
            resp::encode_command(&mut encoded, &cmd.name, cmd.args.iter().map(|a| a.as_slice()));
        }
        if self.tx_mode {
            resp::encode_command(&mut encoded, "EXEC", std::iter::empty());
        }

        let mut conn = self.connection.lock().await;
        let replies = conn.command_batch(&encoded, frame_count).await?;
        drop(conn);

        if !self.tx_mode {
            return Ok(replies);
        }

        // replies[0] = MULTI ack, replies[1..=N] = QUEUED acks,
        // replies[N+1] = EXEC's reply (array of N results, or nil if
        // the transaction was aborted — spec.md §4.5 "EXEC aborting
        // returns a null array, delivered as a single reply").
        match replies.into_iter().last() {
            Some(Value::Array(Some(items))) => Ok(items),
            Some(nil @ Value::Array(None)) => Ok(vec![nil]),
            Some(other) => Ok(vec![other]),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Executor for PipelineExecutor {
    async fn exec(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value> {
        self.enqueue(name, args);
        Ok(Value::SimpleString("OK".to_string()))
    }

    async fn close(&self) {
        let mut conn = self.connection.lock().await;
        conn.close();
    }

    fn as_pipeline(&self) -> Option<&PipelineExecutor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{share, ConnectOpts, Connection};

    fn executor(tx_mode: bool) -> PipelineExecutor {
        let opts = ConnectOpts::default();
        let conn = Connection::lazy(opts).unwrap();
        PipelineExecutor::new(share(conn), tx_mode)
    }

    #[tokio::test]
    async fn send_command_returns_immediate_sentinel() {
        let exec = executor(false);
        let reply = exec.exec("SET", vec![b"k".to_vec(), b"v".to_vec()]).await.unwrap();
        assert_eq!(reply, Value::SimpleString("OK".to_string()));
    }

    #[tokio::test]
    async fn commands_enqueued_between_flushes_land_in_the_next_batch() {
        let exec = executor(false);
        exec.enqueue("PING", vec![]);
        let state = exec.state.lock().await;
        assert_eq!(state.pending.len(), 1);
    }
}
