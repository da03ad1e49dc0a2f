//! Pub/Sub executor and `Subscription` state machine (spec.md §4.6,
//! component C6). Grounded on `lunatic-redis::pubsub::RedisPubSub`
//! (subscribe/unsubscribe bookkeeping, `Msg::from_value`) adapted from
//! lunatic actor methods to a `tokio::sync::mpsc` + `Stream` model, the
//! idiom spec.md §9 calls for ("model as an async iterator / channel
//! receiver / stream").

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::connection::{BackoffPolicy, Connection, ConnectOpts};
use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::resp::{self, Value};

/// A single pushed pub/sub frame (spec.md §6 "Pub/sub push frames").
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub channel: String,
    pub message: Vec<u8>,
    pub pattern: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubState {
    Idle,
    Active,
    Reconnecting,
    Closing,
    Closed,
}

struct Shared {
    connection: Mutex<Connection>,
    channels: Mutex<HashSet<String>>,
    patterns: Mutex<HashSet<String>>,
    state: Mutex<SubState>,
    /// Flips to `true` from `close()` so the read loop can preempt a
    /// pending `raw_push_read()` instead of holding `connection` forever
    /// (spec.md §4.6 "Close"). A `watch` channel, not `Notify`: its version
    /// counter means a signal sent before the loop starts waiting on it is
    /// still observed, where a `Notify::notified()` call started afterwards
    /// would miss it.
    close_signal: watch::Sender<bool>,
}

/// Drives a Connection exclusively dedicated to subscription traffic; only
/// `SUBSCRIBE`/`UNSUBSCRIBE`/`PSUBSCRIBE`/`PUNSUBSCRIBE`/`PING`/`QUIT` are
/// legal on it (spec.md §4.6). Any other command fails with `BadResource`.
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    pub fn new(connection: Connection) -> Self {
        let (close_signal, _) = watch::channel(false);
        Subscription {
            shared: Arc::new(Shared {
                connection: Mutex::new(connection),
                channels: Mutex::new(HashSet::new()),
                patterns: Mutex::new(HashSet::new()),
                state: Mutex::new(SubState::Idle),
                close_signal,
            }),
        }
    }

    const ALLOWED: [&'static str; 6] = ["SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PING", "QUIT"];

    async fn send_control(&self, name: &str, args: &[Vec<u8>]) -> RedisResult<()> {
        if !Self::ALLOWED.contains(&name) {
            return Err(RedisError::from_kind(ErrorKind::BadResource));
        }
        let mut conn = self.shared.connection.lock().await;
        conn.command(name, args).await?;
        Ok(())
    }

    /// Subscribes to the given channels, transitioning Idle/Active → Active
    /// (spec.md §4.6 state machine).
    pub async fn subscribe(&self, channels: &[&str]) -> RedisResult<()> {
        let args: Vec<Vec<u8>> = channels.iter().map(|c| c.as_bytes().to_vec()).collect();
        self.send_control("SUBSCRIBE", &args).await?;
        let mut set = self.shared.channels.lock().await;
        set.extend(channels.iter().map(|c| c.to_string()));
        *self.shared.state.lock().await = SubState::Active;
        Ok(())
    }

    pub async fn psubscribe(&self, patterns: &[&str]) -> RedisResult<()> {
        let args: Vec<Vec<u8>> = patterns.iter().map(|p| p.as_bytes().to_vec()).collect();
        self.send_control("PSUBSCRIBE", &args).await?;
        let mut set = self.shared.patterns.lock().await;
        set.extend(patterns.iter().map(|p| p.to_string()));
        *self.shared.state.lock().await = SubState::Active;
        Ok(())
    }

    pub async fn unsubscribe(&self, channels: &[&str]) -> RedisResult<()> {
        let args: Vec<Vec<u8>> = channels.iter().map(|c| c.as_bytes().to_vec()).collect();
        self.send_control("UNSUBSCRIBE", &args).await?;
        let mut set = self.shared.channels.lock().await;
        for c in channels {
            set.remove(*c);
        }
        if set.is_empty() && self.shared.patterns.lock().await.is_empty() {
            *self.shared.state.lock().await = SubState::Closing;
        }
        Ok(())
    }

    /// Returns the lazy, single-consumer sequence of pushed messages
    /// (spec.md §4.6 `receive()`). Spawns the read loop that classifies
    /// `message`/`pmessage` pushes and forwards them; subscribe/unsubscribe
    /// acks are observed and discarded here rather than surfaced to the
    /// caller.
    ///
    /// The pending read races `close_signal` inside the same `select!` that
    /// holds the connection lock, so a `close()` racing a read with nothing
    /// pending still gets the lock back instead of deadlocking against it.
    /// A transport error walks the loop through `Reconnecting` before
    /// reads resume (spec.md §4.6 "Reconnect behavior").
    pub fn receive(&self) -> Pin<Box<dyn Stream<Item = Message> + Send>> {
        let (sender, receiver) = mpsc::channel(64);
        let shared = self.shared.clone();
        let mut close_rx = shared.close_signal.subscribe();
        tokio::spawn(async move {
            loop {
                if matches!(*shared.state.lock().await, SubState::Closing | SubState::Closed) {
                    break;
                }

                let read = {
                    let mut conn = shared.connection.lock().await;
                    tokio::select! {
                        biased;
                        _ = close_rx.changed() => None,
                        result = conn.raw_push_read() => Some(result),
                    }
                };

                let value = match read {
                    None => break, // close() signaled while a read was pending.
                    Some(Ok(v)) => v,
                    Some(Err(_)) => {
                        if matches!(*shared.state.lock().await, SubState::Closing | SubState::Closed) {
                            break;
                        }
                        if Self::resubscribe_after_loss(&shared).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                match Self::classify(value) {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => continue,
                }
            }
        });
        Box::pin(ReceiverStream::new(receiver))
    }

    fn classify(value: Value) -> Option<Message> {
        let Value::Array(Some(items)) = value else {
            return None;
        };
        let kind = match items.first()? {
            Value::BulkString(Some(b)) => std::str::from_utf8(b).ok()?.to_ascii_lowercase(),
            _ => return None,
        };
        match kind.as_str() {
            "message" if items.len() == 3 => Some(Message {
                channel: bulk_string(&items[1])?,
                message: bulk_bytes(&items[2])?,
                pattern: None,
            }),
            "pmessage" if items.len() == 4 => Some(Message {
                pattern: Some(bulk_string(&items[1])?),
                channel: bulk_string(&items[2])?,
                message: bulk_bytes(&items[3])?,
            }),
            _ => None,
        }
    }

    /// Closes the subscription: unsubscribes from everything if the
    /// connection is healthy, then closes the underlying Connection.
    /// Signals `close_signal` before touching the connection so a read
    /// loop parked in `receive()` lets go of the lock instead of holding
    /// it across these commands (spec.md §4.6 "Close", S5).
    pub async fn close(&self) {
        *self.shared.state.lock().await = SubState::Closing;
        let _ = self.shared.close_signal.send(true);
        {
            let channels: Vec<String> = self.shared.channels.lock().await.iter().cloned().collect();
            let patterns: Vec<String> = self.shared.patterns.lock().await.iter().cloned().collect();
            let mut conn = self.shared.connection.lock().await;
            if conn.is_connected() {
                if !channels.is_empty() {
                    let args: Vec<Vec<u8>> = channels.iter().map(|c| c.as_bytes().to_vec()).collect();
                    let _ = conn.command("UNSUBSCRIBE", &args).await;
                }
                if !patterns.is_empty() {
                    let args: Vec<Vec<u8>> = patterns.iter().map(|p| p.as_bytes().to_vec()).collect();
                    let _ = conn.command("PUNSUBSCRIBE", &args).await;
                }
            }
            conn.close();
        }
        *self.shared.state.lock().await = SubState::Closed;
    }

    pub async fn is_closed(&self) -> bool {
        *self.shared.state.lock().await == SubState::Closed
    }

    /// Reconnects a fresh Connection and replays `SUBSCRIBE`/`PSUBSCRIBE`
    /// for every tracked name (spec.md §4.6 "Reconnect behavior"). Exposed
    /// for callers that want to force a reconnect directly; the read loop
    /// in `receive()` instead calls the bounded, backoff-paced version
    /// below on its own once a transport error surfaces.
    pub async fn reconnect_and_resubscribe(&self) -> RedisResult<()> {
        let options = self.shared.connection.lock().await.options().clone();
        Self::reconnect_once(&self.shared, &options).await?;
        *self.shared.state.lock().await = SubState::Active;
        Ok(())
    }

    /// Bounded reconnect-and-resubscribe loop driven from the read loop's
    /// error branch: `Active → Reconnecting → Active` on success, or
    /// `Reconnecting → Closed` once the connection's `maxRetryCount`
    /// attempts are exhausted (spec.md §4.6 state machine; invariant P5's
    /// reconnect half). Messages published while disconnected are lost by
    /// design — P5 only promises redelivery for messages published *after*
    /// reconnect.
    async fn resubscribe_after_loss(shared: &Arc<Shared>) -> RedisResult<()> {
        *shared.state.lock().await = SubState::Reconnecting;
        let options = shared.connection.lock().await.options().clone();
        let backoff = BackoffPolicy::new(100, 8_000, options.max_retry_count.max(1));
        let mut last_err = None;
        for attempt in 1..=backoff.max_attempts() {
            tokio::time::sleep(backoff.delay_for(attempt)).await;
            match Self::reconnect_once(shared, &options).await {
                Ok(()) => {
                    *shared.state.lock().await = SubState::Active;
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "pub/sub reconnect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        *shared.state.lock().await = SubState::Closed;
        Err(last_err.unwrap_or_else(|| RedisError::from_kind(ErrorKind::ConnectionClosed)))
    }

    async fn reconnect_once(shared: &Arc<Shared>, options: &ConnectOpts) -> RedisResult<()> {
        let mut fresh = Connection::connect(options.clone()).await?;
        let channels: Vec<String> = shared.channels.lock().await.iter().cloned().collect();
        let patterns: Vec<String> = shared.patterns.lock().await.iter().cloned().collect();
        if !channels.is_empty() {
            let args: Vec<Vec<u8>> = channels.iter().map(|c| c.as_bytes().to_vec()).collect();
            fresh.command("SUBSCRIBE", &args).await?;
        }
        if !patterns.is_empty() {
            let args: Vec<Vec<u8>> = patterns.iter().map(|p| p.as_bytes().to_vec()).collect();
            fresh.command("PSUBSCRIBE", &args).await?;
        }
        *shared.connection.lock().await = fresh;
        Ok(())
    }
}

fn bulk_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(Some(b)) => std::str::from_utf8(b).ok().map(|s| s.to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn bulk_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(Some(b)) => Some(b.clone()),
        _ => None,
    }
}

/// Opens a dedicated Connection for subscription traffic.
pub async fn connect(options: ConnectOpts) -> RedisResult<Subscription> {
    let conn = Connection::connect(options).await?;
    Ok(Subscription::new(conn))
}

impl Connection {
    /// Reads one raw reply frame without going through the
    /// write-then-read command cycle — used by the pub/sub read loop,
    /// which only ever reads server-pushed frames (spec.md §4.6).
    pub(crate) async fn raw_push_read(&mut self) -> RedisResult<Value> {
        if !self.is_connected() {
            return Err(RedisError::from_kind(ErrorKind::ConnectionClosed));
        }
        resp::read_reply_or_value(self.reader_for_push().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_message_push() {
        let v = Value::Array(Some(vec![
            Value::BulkString(Some(b"message".to_vec())),
            Value::BulkString(Some(b"chan1".to_vec())),
            Value::BulkString(Some(b"hello".to_vec())),
        ]));
        let msg = Subscription::classify(v).unwrap();
        assert_eq!(msg.channel, "chan1");
        assert_eq!(msg.message, b"hello");
        assert_eq!(msg.pattern, None);
    }

    #[test]
    fn classifies_pmessage_push() {
        let v = Value::Array(Some(vec![
            Value::BulkString(Some(b"pmessage".to_vec())),
            Value::BulkString(Some(b"ch*".to_vec())),
            Value::BulkString(Some(b"chan1".to_vec())),
            Value::BulkString(Some(b"hello".to_vec())),
        ]));
        let msg = Subscription::classify(v).unwrap();
        assert_eq!(msg.pattern.as_deref(), Some("ch*"));
        assert_eq!(msg.channel, "chan1");
    }

    #[test]
    fn ignores_subscribe_ack() {
        let v = Value::Array(Some(vec![
            Value::BulkString(Some(b"subscribe".to_vec())),
            Value::BulkString(Some(b"chan1".to_vec())),
            Value::Integer(1),
        ]));
        assert!(Subscription::classify(v).is_none());
    }
}
