//! Cluster dispatcher (spec.md §4.7, component C7): a keyed routing layer
//! over a pool of Connections, one per cluster node, transparently
//! following `-MOVED`/`-ASK` redirections.
//!
//! Grounded on `lunatic-redis::types::RedisError::code()` for recognizing
//! the redirection codes, and on
//! `glide-core::client::standalone_client::StandaloneClient` for the
//! pattern of memoizing connections by address and re-dispatching on
//! failure — generalized here from one node to a `host:port`-keyed pool.

pub mod slot;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::{share, ConnectOpts, Connection, ConnectionAddr, SharedConnection};
use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::resp::Value;

pub use slot::slot_for_key;

/// Builds a Connection for a node the dispatcher hasn't talked to yet.
/// The indirection lets tests intercept connection creation and simulate
/// `-MOVED`/`-ASK` without a real cluster (spec.md §4.7 "The factory
/// indirection lets tests intercept and simulate").
pub type ConnectionFactory = Arc<
    dyn Fn(ConnectionAddr) -> Pin<Box<dyn Future<Output = RedisResult<Connection>> + Send>> + Send + Sync,
>;

pub struct ClusterConfig {
    pub seeds: Vec<ConnectionAddr>,
    pub max_redirections: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            seeds: Vec::new(),
            max_redirections: 16,
        }
    }
}

pub struct ClusterDispatcher {
    config: ClusterConfig,
    factory: ConnectionFactory,
    slot_map: Mutex<HashMap<u16, ConnectionAddr>>,
    connections: Mutex<HashMap<String, SharedConnection>>,
}

impl ClusterDispatcher {
    pub fn new(config: ClusterConfig, base_options: ConnectOpts) -> Self {
        let factory: ConnectionFactory = Arc::new(move |addr: ConnectionAddr| {
            let mut opts = base_options.clone();
            opts.hostname = addr.host;
            opts.port = addr.port;
            Box::pin(async move { Connection::connect(opts).await })
        });
        ClusterDispatcher {
            config,
            factory,
            slot_map: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Lets tests swap in a factory that simulates `-MOVED`/`-ASK` without
    /// a real cluster, per spec.md §4.7.
    pub fn with_factory(config: ClusterConfig, factory: ConnectionFactory) -> Self {
        ClusterDispatcher {
            config,
            factory,
            slot_map: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    async fn connection_for(&self, addr: &ConnectionAddr) -> RedisResult<SharedConnection> {
        let key = addr.to_string();
        let mut conns = self.connections.lock().await;
        if let Some(conn) = conns.get(&key) {
            return Ok(conn.clone());
        }
        let connection = (self.factory)(addr.clone()).await?;
        let shared = share(connection);
        conns.insert(key, shared.clone());
        Ok(shared)
    }

    async fn seed_addr(&self) -> RedisResult<ConnectionAddr> {
        self.config
            .seeds
            .first()
            .cloned()
            .ok_or_else(|| RedisError::new(ErrorKind::ConnectError, "no seed nodes configured"))
    }

    async fn target_for_slot(&self, slot: u16) -> RedisResult<ConnectionAddr> {
        let map = self.slot_map.lock().await;
        match map.get(&slot) {
            Some(addr) => Ok(addr.clone()),
            None => self.seed_addr().await,
        }
    }

    /// Computes the slot for a command's key arguments (spec.md §4.7 step
    /// 1-2). `keys` is empty for commands with no key argument (e.g.
    /// `PING`), in which case any seed/memoized node will do.
    fn slot_for_keys(keys: &[&[u8]]) -> RedisResult<Option<u16>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let first = slot::slot_for_key(keys[0]);
        for key in &keys[1..] {
            if slot::slot_for_key(key) != first {
                return Err(RedisError::new(
                    ErrorKind::CrossSlot,
                    "CROSSSLOT Keys in request don't hash to the same slot",
                ));
            }
        }
        Ok(Some(first))
    }

    /// Routes one command, following `-MOVED`/`-ASK` redirections up to
    /// `maxRedirections` (spec.md §4.7 steps 3-6).
    pub async fn exec(&self, name: &str, args: Vec<Vec<u8>>, keys: &[&[u8]]) -> RedisResult<Value> {
        let slot = Self::slot_for_keys(keys)?;
        let mut target = match slot {
            Some(slot) => self.target_for_slot(slot).await?,
            None => self.seed_addr().await?,
        };
        let mut asking = false;
        let mut redirections = 0u32;

        loop {
            let connection = self.connection_for(&target).await?;
            let result = {
                let mut conn = connection.lock().await;
                if asking {
                    conn.command("ASKING", &[]).await?;
                }
                conn.command(name, &args).await
            };
            asking = false;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_moved() => {
                    redirections += 1;
                    if redirections > self.config.max_redirections {
                        return Err(RedisError::new(
                            ErrorKind::TooManyRedirections,
                            "Too many Cluster redirections?",
                        ));
                    }
                    let (redirect_slot, addr) = e
                        .redirect_node()
                        .ok_or_else(|| RedisError::new(ErrorKind::ErrorReply, "malformed MOVED frame"))?;
                    let new_addr = parse_host_port(addr)?;
                    debug!(slot = redirect_slot, target = %new_addr, "following -MOVED redirection");
                    self.slot_map.lock().await.insert(redirect_slot, new_addr.clone());
                    target = new_addr;
                }
                Err(e) if e.is_ask() => {
                    redirections += 1;
                    if redirections > self.config.max_redirections {
                        return Err(RedisError::new(
                            ErrorKind::TooManyRedirections,
                            "Too many Cluster redirections?",
                        ));
                    }
                    let (_, addr) = e
                        .redirect_node()
                        .ok_or_else(|| RedisError::new(ErrorKind::ErrorReply, "malformed ASK frame"))?;
                    // -ASK does not update the slot map (spec.md §4.7 step 5).
                    target = parse_host_port(addr)?;
                    asking = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Optional initial topology probe (spec.md §9 "Optional enhancement:
    /// an initial CLUSTER SLOTS probe"). Reactive `-MOVED` handling alone
    /// is sufficient for correctness; calling this just avoids the first
    /// request to any newly-owned slot taking a redirection round trip.
    pub async fn refresh_slots(&self) -> RedisResult<()> {
        let seed = self.seed_addr().await?;
        let connection = self.connection_for(&seed).await?;
        let reply = {
            let mut conn = connection.lock().await;
            conn.command("CLUSTER", &[b"SLOTS".to_vec()]).await?
        };
        let Value::Array(Some(ranges)) = reply else {
            return Ok(());
        };
        let mut map = self.slot_map.lock().await;
        for range in ranges {
            let Value::Array(Some(fields)) = range else { continue };
            if fields.len() < 3 {
                continue;
            }
            let (Value::Integer(start), Value::Integer(end)) = (&fields[0], &fields[1]) else {
                continue;
            };
            let Value::Array(Some(node)) = &fields[2] else { continue };
            let Some(Value::BulkString(Some(host))) = node.first() else { continue };
            let Some(Value::Integer(port)) = node.get(1) else { continue };
            let Ok(host) = std::str::from_utf8(host) else { continue };
            let addr = ConnectionAddr {
                host: host.to_string(),
                port: *port as u16,
            };
            for slot in *start..=*end {
                map.insert(slot as u16, addr.clone());
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        let mut conns = self.connections.lock().await;
        for (_, conn) in conns.drain() {
            conn.lock().await.close();
        }
    }
}

fn parse_host_port(addr: &str) -> RedisResult<ConnectionAddr> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| RedisError::new(ErrorKind::ErrorReply, "malformed redirection target"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| RedisError::new(ErrorKind::ErrorReply, "malformed redirection port"))?;
    Ok(ConnectionAddr {
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_slot_detected_before_any_network_use() {
        let keys: Vec<&[u8]> = vec![b"{a}x", b"{b}y"];
        let err = ClusterDispatcher::slot_for_keys(&keys).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossSlot);
    }

    #[test]
    fn same_hash_tag_is_not_cross_slot() {
        let keys: Vec<&[u8]> = vec![b"{a}x", b"{a}y"];
        assert!(ClusterDispatcher::slot_for_keys(&keys).unwrap().is_some());
    }

    #[test]
    fn parses_redirection_target() {
        let addr = parse_host_port("127.0.0.1:7002").unwrap();
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 7002);
    }
}
