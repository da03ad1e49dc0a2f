//! An async client driver for Redis-compatible servers.
//!
//! Built around a pluggable [`executor::Executor`] seam: the same command
//! surface on [`Client`] can be backed by a direct connection, a
//! pipeline/transaction batch, or a cluster dispatcher that follows
//! `-MOVED`/`-ASK` redirections transparently.
//!
//! ```no_run
//! # async fn run() -> redis_driver::error::RedisResult<()> {
//! use redis_driver::{connection::parse_url, Client};
//!
//! let opts = parse_url("redis://127.0.0.1:6379/0")?;
//! let client = Client::open(opts).await?;
//! client.set("name", "bar").await?;
//! assert_eq!(client.get("name").await?, Some("bar".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod client;
pub mod cluster;
pub mod connection;
pub mod error;
pub mod executor;
pub mod resp;
pub mod value_conversion;

pub use args::ToRedisArgs;
pub use client::Client;
pub use error::{ErrorKind, RedisError, RedisResult};
pub use resp::{Value, ValueType};
pub use value_conversion::FromRedisValue;
