//! Connection lifecycle, handshake and reconnect policy (spec.md §4.2/§4.3,
//! components C2/C3). Grounded on `lunatic-redis::connection::{connect,
//! setup_connection, connect_auth, Connection}` for handshake ordering, and
//! on `glide-core/src/client/reconnecting_connection.rs` for the
//! gated-reconnect / replay-once state machine, re-expressed over `tokio`
//! (see the architectural note in `DESIGN.md`).

pub mod backoff;
pub mod transport;
pub mod url;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::resp::{self, Value};
pub use backoff::BackoffPolicy;
pub use transport::Transport;
pub use url::{parse_url, ConnectOpts, ConnectionAddr};

/// spec.md §3 `Connection state`'s `state` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Closed,
    Connecting,
    Ready,
    Broken,
    Draining,
}

/// A single duplex connection to one server: handshake, health tracking
/// and transparent reconnect-with-replay live here so every executor
/// (direct, pipeline, pub/sub, cluster) shares the same discipline.
pub struct Connection {
    addr: ConnectionAddr,
    options: ConnectOpts,
    transport: Option<Transport>,
    generation: u64,
    state: State,
    retry_count: u32,
    backoff: BackoffPolicy,
}

impl Connection {
    /// Opens a transport and runs the handshake (spec.md §4.3 "Handshake").
    pub async fn connect(options: ConnectOpts) -> RedisResult<Self> {
        options.validate()?;
        let addr = options.addr();
        let mut conn = Connection {
            addr: addr.clone(),
            backoff: BackoffPolicy::new(100, 8_000, options.max_retry_count.max(1)),
            options,
            transport: None,
            generation: 0,
            state: State::Closed,
            retry_count: 0,
        };
        conn.establish().await?;
        Ok(conn)
    }

    /// Returns a Connection in the `Closed` state without touching the
    /// network — the lazy-client variant of spec.md §3 "Lifecycles".
    pub fn lazy(options: ConnectOpts) -> RedisResult<Self> {
        options.validate()?;
        let addr = options.addr();
        Ok(Connection {
            addr,
            backoff: BackoffPolicy::new(100, 8_000, options.max_retry_count.max(1)),
            options,
            transport: None,
            generation: 0,
            state: State::Closed,
            retry_count: 0,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed || self.state == State::Draining
    }

    pub fn addr(&self) -> &ConnectionAddr {
        &self.addr
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Opens the transport and runs AUTH/SELECT/CLIENT SETNAME in order.
    /// Any handshake failure is a fatal, non-retried `ConnectError`
    /// (spec.md §4.3: "authentication failures are never retried").
    async fn establish(&mut self) -> RedisResult<()> {
        self.state = State::Connecting;
        let tls = self.options.tls;
        let mut transport = Transport::connect(&self.addr, tls).await?;

        if let Err(e) = Self::handshake(&mut transport, &self.options).await {
            transport.close();
            self.state = State::Closed;
            return Err(e);
        }

        self.transport = Some(transport);
        self.generation += 1;
        self.state = State::Ready;
        self.retry_count = 0;
        debug!(addr = %self.addr, generation = self.generation, "connection established");
        Ok(())
    }

    async fn handshake(transport: &mut Transport, options: &ConnectOpts) -> RedisResult<()> {
        if let Some(password) = &options.password {
            let mut args: Vec<&[u8]> = Vec::new();
            if let Some(name) = &options.name {
                args.push(name.as_bytes());
            }
            args.push(password.as_bytes());
            Self::handshake_command(transport, "AUTH", &args)
                .await
                .map_err(|e| RedisError::new(ErrorKind::ConnectError, format!("AUTH failed: {e}")))?;
        }
        if options.db > 0 {
            let db = options.db.to_string();
            Self::handshake_command(transport, "SELECT", &[db.as_bytes()])
                .await
                .map_err(|e| RedisError::new(ErrorKind::ConnectError, format!("SELECT failed: {e}")))?;
        }
        if let Some(name) = &options.name {
            Self::handshake_command(transport, "CLIENT", &[b"SETNAME", name.as_bytes()])
                .await
                .map_err(|e| {
                    RedisError::new(ErrorKind::ConnectError, format!("CLIENT SETNAME failed: {e}"))
                })?;
        }
        Ok(())
    }

    async fn handshake_command(transport: &mut Transport, name: &str, args: &[&[u8]]) -> RedisResult<Value> {
        let mut buf = Vec::new();
        resp::encode_command(&mut buf, name, args.iter().copied());
        transport.write_all(&buf).await?;
        resp::read_reply(transport.reader()).await
    }

    /// Runs one command to completion, transparently reconnecting and
    /// replaying it exactly once on a transport-level failure (spec.md
    /// §4.3 "Reconnect policy"). Protocol-level failures (`InvalidState`)
    /// and server errors are never retried.
    pub async fn command(&mut self, name: &str, args: &[Vec<u8>]) -> RedisResult<Value> {
        match self.try_command(name, args).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_connection_dropped() => {
                self.state = State::Broken;
                self.reconnect_with_backoff().await?;
                self.try_command(name, args).await
            }
            Err(e) => {
                if e.kind() == ErrorKind::InvalidState {
                    self.state = State::Broken;
                }
                Err(e)
            }
        }
    }

    async fn try_command(&mut self, name: &str, args: &[Vec<u8>]) -> RedisResult<Value> {
        if self.state == State::Closed {
            self.establish().await?;
        }
        if self.state != State::Ready {
            return Err(RedisError::from_kind(ErrorKind::ConnectionClosed));
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RedisError::from_kind(ErrorKind::ConnectionClosed))?;

        let mut buf = Vec::new();
        let arg_refs = args.iter().map(|a| a.as_slice());
        resp::encode_command(&mut buf, name, arg_refs);
        transport.write_all(&buf).await?;
        resp::read_reply(transport.reader()).await
    }

    /// Writes a pre-encoded batch and reads exactly `count` reply frames
    /// in order (spec.md §4.5 "Dispatch"). Each reply is captured as data
    /// — an error frame does not abort the read loop.
    pub async fn command_batch(&mut self, encoded: &[u8], count: usize) -> RedisResult<Vec<Value>> {
        if self.state == State::Closed {
            self.establish().await?;
        }
        if self.state != State::Ready {
            return Err(RedisError::from_kind(ErrorKind::ConnectionClosed));
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RedisError::from_kind(ErrorKind::ConnectionClosed))?;

        if let Err(e) = transport.write_all(encoded).await {
            self.state = State::Broken;
            return Err(e);
        }

        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            match resp::read_reply_or_value(self.transport.as_mut().unwrap().reader()).await {
                Ok(value) => replies.push(value),
                Err(e) => {
                    self.state = State::Broken;
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    async fn reconnect_with_backoff(&mut self) -> RedisResult<()> {
        for attempt in 1..=self.backoff.max_attempts() {
            match self.establish().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(addr = %self.addr, attempt, error = %e, "reconnect attempt failed");
                    self.retry_count = attempt;
                    if attempt < self.backoff.max_attempts() {
                        tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    }
                }
            }
        }
        self.state = State::Broken;
        Err(RedisError::from_kind(ErrorKind::ConnectionClosed))
    }

    /// Closing cancels in-flight use of the transport; later commands
    /// observe `ConnectionClosed` rather than attempting to reconnect
    /// (spec.md §4.3 "Close semantics").
    pub fn close(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
        self.state = State::Closed;
    }

    pub fn options(&self) -> &ConnectOpts {
        &self.options
    }

    /// Exposes the transport's buffered reader directly, for callers that
    /// only ever read server-pushed frames (the pub/sub executor's read
    /// loop) rather than running a write-then-read command cycle.
    pub(crate) async fn reader_for_push(&mut self) -> RedisResult<&mut (impl tokio::io::AsyncBufRead + Unpin)> {
        self.transport
            .as_mut()
            .map(|t| t.reader())
            .ok_or_else(|| RedisError::from_kind(ErrorKind::ConnectionClosed))
    }
}

/// A `Connection` shared by multiple logical tasks (pipeline, cluster
/// dispatcher), serialized through a single mutex — spec.md §5
/// "serialization is enforced by explicit FIFO queues"; `tokio::sync::Mutex`
/// gives FIFO wakeup order for free.
pub type SharedConnection = std::sync::Arc<Mutex<Connection>>;

pub fn share(connection: Connection) -> SharedConnection {
    std::sync::Arc::new(Mutex::new(connection))
}
