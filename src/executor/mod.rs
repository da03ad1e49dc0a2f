//! The pluggable executor seam (spec.md §9 design note: "the executor
//! interface ... is the key extensibility seam"). Grounded on
//! `lunatic-redis::connection::ConnectionLike`, re-shaped to the single
//! `exec` operation spec.md names and made dyn-dispatchable with
//! `async-trait` the way `glide-core` dispatches across its client
//! variants.

pub mod direct;
pub mod pipeline;
pub mod pubsub;

use async_trait::async_trait;

use crate::error::RedisResult;
use crate::resp::Value;

/// One method, `exec`, plus connection/close accessors — pipeline,
/// transaction and cluster executors all specialize this (spec.md §9).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn exec(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value>;

    /// The raw escape hatch exposed by the facade's `sendCommand`
    /// (spec.md §4.8) is just `exec` under another name at this layer;
    /// kept as a distinct method so pipeline executors can give it
    /// sentinel semantics (spec.md §4.5) without changing `exec`'s
    /// contract for direct/cluster use.
    async fn send_command(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value> {
        self.exec(name, args).await
    }

    async fn close(&self);

    /// Narrowing hooks the facade uses to reach executor-specific methods
    /// (`PipelineExecutor::flush`, `DirectExecutor::connection`) through a
    /// `dyn Executor`. `None` by default; only the two concrete executors
    /// that need to be recovered this way override them.
    fn as_direct(&self) -> Option<&direct::DirectExecutor> {
        None
    }

    fn as_pipeline(&self) -> Option<&pipeline::PipelineExecutor> {
        None
    }
}
