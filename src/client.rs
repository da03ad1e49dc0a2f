//! The facade (spec.md §4.8, component C8): one method per Redis command
//! over a pluggable [`Executor`], plus `pipeline()`/`tx()`/`subscribe()`/
//! `sendCommand()`/`close()`.
//!
//! Grounded on `lunatic-redis/examples/*.rs` for the command-call shape
//! (`client.get(key).await?`) and on `glide-core/src/client/mod.rs` for a
//! facade holding an executor and exposing pipeline/subscribe entry
//! points atop it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::args::ToRedisArgs;
use crate::cluster::{ClusterConfig, ClusterDispatcher};
use crate::connection::{share, ConnectOpts, Connection, SharedConnection};
use crate::error::RedisResult;
use crate::executor::direct::DirectExecutor;
use crate::executor::pipeline::PipelineExecutor;
use crate::executor::pubsub::{self, Subscription};
use crate::executor::Executor;
use crate::resp::Value;
use crate::value_conversion::FromRedisValue;

/// Where commands are actually sent: a single Connection (standalone) or
/// the cluster dispatcher. Kept as an enum rather than always going
/// through `Executor` because cluster dispatch needs the command's key
/// arguments, which the `Executor` trait's single `exec` method doesn't
/// carry (spec.md §4.7 "Compute slot from the first key argument").
enum Backend {
    Standalone(Arc<dyn Executor>),
    Cluster(Arc<ClusterDispatcher>),
}

/// Presents the Redis command surface atop an executor or cluster
/// dispatcher (spec.md §4.8).
pub struct Client {
    backend: Backend,
}

fn args_of<T: ToRedisArgs>(value: &T) -> Vec<Vec<u8>> {
    value.to_redis_args()
}

impl Client {
    /// Opens a Connection eagerly and wraps it in a direct executor.
    pub async fn open(opts: ConnectOpts) -> RedisResult<Self> {
        let connection = Connection::connect(opts).await?;
        Ok(Self::from_connection(share(connection)))
    }

    /// Defers connection establishment until the first command (spec.md
    /// §4.8 `createLazyClient`); `is_connected()` still reflects the
    /// actual socket state once a command has run.
    pub fn connect_lazy(opts: ConnectOpts) -> RedisResult<Self> {
        let connection = Connection::lazy(opts)?;
        Ok(Self::from_connection(share(connection)))
    }

    fn from_connection(connection: SharedConnection) -> Self {
        Client {
            backend: Backend::Standalone(Arc::new(DirectExecutor::new(connection))),
        }
    }

    /// Connects to a Redis Cluster given a set of seed nodes.
    pub fn open_cluster(seeds: Vec<ConnectOpts>, max_redirections: u32) -> RedisResult<Self> {
        let base = seeds
            .first()
            .cloned()
            .unwrap_or_default();
        let config = ClusterConfig {
            seeds: seeds.iter().map(|o| o.addr()).collect(),
            max_redirections,
        };
        Ok(Client {
            backend: Backend::Cluster(Arc::new(ClusterDispatcher::new(config, base))),
        })
    }

    async fn exec(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value> {
        self.exec_with_keys(name, args, &[]).await
    }

    async fn exec_with_keys(&self, name: &str, args: Vec<Vec<u8>>, keys: &[&[u8]]) -> RedisResult<Value> {
        match &self.backend {
            Backend::Standalone(executor) => executor.exec(name, args).await,
            Backend::Cluster(dispatcher) => dispatcher.exec(name, args, keys).await,
        }
    }

    /// The raw escape hatch: returns the tagged reply value directly
    /// (spec.md §4.8 `sendCommand`).
    pub async fn send_command(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value> {
        self.exec(name, args).await
    }

    pub async fn close(&self) {
        match &self.backend {
            Backend::Standalone(executor) => executor.close().await,
            Backend::Cluster(dispatcher) => dispatcher.close().await,
        }
    }

    /// Returns a new facade bound to a pipeline executor on the same
    /// Connection (spec.md §4.8). Only meaningful for the standalone
    /// backend — pipelining across cluster nodes is out of scope
    /// (spec.md §1 Non-goals).
    pub fn pipeline(&self) -> RedisResult<Client> {
        self.new_batch_client(false)
    }

    pub fn tx(&self) -> RedisResult<Client> {
        self.new_batch_client(true)
    }

    fn new_batch_client(&self, tx_mode: bool) -> RedisResult<Client> {
        match &self.backend {
            Backend::Standalone(executor) => {
                let direct = executor
                    .as_any_direct()
                    .expect("pipeline()/tx() require a standalone DirectExecutor");
                Ok(Client {
                    backend: Backend::Standalone(Arc::new(PipelineExecutor::new(direct.connection(), tx_mode))),
                })
            }
            Backend::Cluster(_) => Err(crate::error::RedisError::new(
                crate::error::ErrorKind::BadResource,
                "pipeline()/tx() are not supported on a cluster client",
            )),
        }
    }

    /// Flushes a pipeline/transaction facade's buffered commands. No-op
    /// (returns an empty list) on a facade that isn't pipeline-backed.
    pub async fn flush(&self) -> RedisResult<Vec<Value>> {
        match &self.backend {
            Backend::Standalone(executor) => match executor.as_any_pipeline() {
                Some(pipeline) => pipeline.flush().await,
                None => Ok(Vec::new()),
            },
            Backend::Cluster(_) => Ok(Vec::new()),
        }
    }

    /// Takes exclusive ownership of a dedicated Connection and returns a
    /// Subscription (spec.md §4.8).
    pub async fn subscribe(opts: ConnectOpts, channels: &[&str]) -> RedisResult<Subscription> {
        let sub = pubsub::connect(opts).await?;
        sub.subscribe(channels).await?;
        Ok(sub)
    }

    pub async fn psubscribe(opts: ConnectOpts, patterns: &[&str]) -> RedisResult<Subscription> {
        let sub = pubsub::connect(opts).await?;
        sub.psubscribe(patterns).await?;
        Ok(sub)
    }

    // -- Illustrative command surface (spec.md §6, not exhaustive) --

    pub async fn get<K: ToRedisArgs>(&self, key: K) -> RedisResult<Option<String>> {
        let value = self.exec("GET", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&value)
    }

    pub async fn set<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<()> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("SET", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn setex<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, seconds: i64, value: V) -> RedisResult<()> {
        let mut args = args_of(&key);
        args.extend(args_of(&seconds));
        args.extend(args_of(&value));
        let reply = self.exec("SETEX", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn setnx<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<bool> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("SETNX", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn append<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("APPEND", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn exists<K: ToRedisArgs>(&self, key: K) -> RedisResult<bool> {
        let reply = self.exec("EXISTS", args_of(&key)).await?;
        Ok(i64::from_redis_value(&reply)? != 0)
    }

    pub async fn del<K: ToRedisArgs>(&self, key: K) -> RedisResult<i64> {
        let reply = self.exec("DEL", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn mget<K: ToRedisArgs>(&self, keys: K) -> RedisResult<Vec<Option<String>>> {
        let reply = self.exec("MGET", args_of(&keys)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn mset<K: ToRedisArgs, V: ToRedisArgs>(&self, pairs: &[(K, V)]) -> RedisResult<()> {
        let mut args = Vec::new();
        for (k, v) in pairs {
            args.extend(args_of(k));
            args.extend(args_of(v));
        }
        let reply = self.exec("MSET", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn msetnx<K: ToRedisArgs, V: ToRedisArgs>(&self, pairs: &[(K, V)]) -> RedisResult<bool> {
        let mut args = Vec::new();
        for (k, v) in pairs {
            args.extend(args_of(k));
            args.extend(args_of(v));
        }
        let reply = self.exec("MSETNX", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn incr<K: ToRedisArgs>(&self, key: K) -> RedisResult<i64> {
        let reply = self.exec("INCR", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn decr<K: ToRedisArgs>(&self, key: K) -> RedisResult<i64> {
        let reply = self.exec("DECR", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn incrby<K: ToRedisArgs>(&self, key: K, delta: i64) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&delta));
        let reply = self.exec("INCRBY", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn decrby<K: ToRedisArgs>(&self, key: K, delta: i64) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&delta));
        let reply = self.exec("DECRBY", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn incrbyfloat<K: ToRedisArgs>(&self, key: K, delta: f64) -> RedisResult<f64> {
        let mut args = args_of(&key);
        args.extend(args_of(&delta));
        let reply = self.exec("INCRBYFLOAT", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn expire<K: ToRedisArgs>(&self, key: K, seconds: i64) -> RedisResult<bool> {
        let mut args = args_of(&key);
        args.extend(args_of(&seconds));
        let reply = self.exec("EXPIRE", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn ttl<K: ToRedisArgs>(&self, key: K) -> RedisResult<i64> {
        let reply = self.exec("TTL", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn getrange<K: ToRedisArgs>(&self, key: K, start: i64, end: i64) -> RedisResult<String> {
        let mut args = args_of(&key);
        args.extend(args_of(&start));
        args.extend(args_of(&end));
        let reply = self.exec("GETRANGE", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn setrange<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, offset: i64, value: V) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&offset));
        args.extend(args_of(&value));
        let reply = self.exec("SETRANGE", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn getset<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<Option<String>> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("GETSET", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn strlen<K: ToRedisArgs>(&self, key: K) -> RedisResult<i64> {
        let reply = self.exec("STRLEN", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn hset<K: ToRedisArgs, F: ToRedisArgs, V: ToRedisArgs>(&self, key: K, field: F, value: V) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&field));
        args.extend(args_of(&value));
        let reply = self.exec("HSET", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn hget<K: ToRedisArgs, F: ToRedisArgs>(&self, key: K, field: F) -> RedisResult<Option<String>> {
        let mut args = args_of(&key);
        args.extend(args_of(&field));
        let reply = self.exec("HGET", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn hgetall<K: ToRedisArgs>(&self, key: K) -> RedisResult<HashMap<String, String>> {
        let reply = self.exec("HGETALL", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn lpush<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("LPUSH", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn rpush<K: ToRedisArgs, V: ToRedisArgs>(&self, key: K, value: V) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&value));
        let reply = self.exec("RPUSH", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn lrange<K: ToRedisArgs>(&self, key: K, start: i64, stop: i64) -> RedisResult<Vec<String>> {
        let mut args = args_of(&key);
        args.extend(args_of(&start));
        args.extend(args_of(&stop));
        let reply = self.exec("LRANGE", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn sadd<K: ToRedisArgs, M: ToRedisArgs>(&self, key: K, member: M) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&member));
        let reply = self.exec("SADD", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn smembers<K: ToRedisArgs>(&self, key: K) -> RedisResult<Vec<String>> {
        let reply = self.exec("SMEMBERS", args_of(&key)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn zadd<K: ToRedisArgs, M: ToRedisArgs>(&self, key: K, score: f64, member: M) -> RedisResult<i64> {
        let mut args = args_of(&key);
        args.extend(args_of(&score));
        args.extend(args_of(&member));
        let reply = self.exec("ZADD", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn zrange<K: ToRedisArgs>(&self, key: K, start: i64, stop: i64) -> RedisResult<Vec<String>> {
        let mut args = args_of(&key);
        args.extend(args_of(&start));
        args.extend(args_of(&stop));
        let reply = self.exec("ZRANGE", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn flushdb(&self) -> RedisResult<()> {
        let reply = self.exec("FLUSHDB", Vec::new()).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn ping(&self) -> RedisResult<String> {
        let reply = self.exec("PING", Vec::new()).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn select(&self, db: i64) -> RedisResult<()> {
        let reply = self.exec("SELECT", args_of(&db)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn auth(&self, password: &str) -> RedisResult<()> {
        let reply = self.exec("AUTH", args_of(&password)).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn client_getname(&self) -> RedisResult<Option<String>> {
        let reply = self.exec("CLIENT", vec![b"GETNAME".to_vec()]).await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn eval(&self, script: &str, keys: &[&str], args: &[&str]) -> RedisResult<Value> {
        let mut cmd_args = vec![script.as_bytes().to_vec(), keys.len().to_string().into_bytes()];
        cmd_args.extend(keys.iter().map(|k| k.as_bytes().to_vec()));
        cmd_args.extend(args.iter().map(|a| a.as_bytes().to_vec()));
        self.exec("EVAL", cmd_args).await
    }

    #[cfg(feature = "script")]
    pub async fn evalsha(&self, sha1: &str, keys: &[&str], args: &[&str]) -> RedisResult<Value> {
        let mut cmd_args = vec![sha1.as_bytes().to_vec(), keys.len().to_string().into_bytes()];
        cmd_args.extend(keys.iter().map(|k| k.as_bytes().to_vec()));
        cmd_args.extend(args.iter().map(|a| a.as_bytes().to_vec()));
        self.exec("EVALSHA", cmd_args).await
    }

    #[cfg(feature = "script")]
    pub async fn script_load(&self, script: &str) -> RedisResult<String> {
        let reply = self
            .exec("SCRIPT", vec![b"LOAD".to_vec(), script.as_bytes().to_vec()])
            .await?;
        FromRedisValue::from_redis_value(&reply)
    }

    pub async fn publish<C: ToRedisArgs, M: ToRedisArgs>(&self, channel: C, message: M) -> RedisResult<i64> {
        let mut args = args_of(&channel);
        args.extend(args_of(&message));
        let reply = self.exec("PUBLISH", args).await?;
        FromRedisValue::from_redis_value(&reply)
    }
}

/// Downcasting helpers so the facade can reach pipeline-specific methods
/// (`flush`) and the standalone connection handle (`pipeline()`/`tx()`)
/// through the `Arc<dyn Executor>` it otherwise treats uniformly.
trait ExecutorExt {
    fn as_any_direct(&self) -> Option<&DirectExecutor>;
    fn as_any_pipeline(&self) -> Option<&PipelineExecutor>;
}

impl ExecutorExt for Arc<dyn Executor> {
    fn as_any_direct(&self) -> Option<&DirectExecutor> {
        self.as_direct()
    }

    fn as_any_pipeline(&self) -> Option<&PipelineExecutor> {
        self.as_pipeline()
    }
}
