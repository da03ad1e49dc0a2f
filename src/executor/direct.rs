//! Direct executor (spec.md §4.4, component C4): one command at a time,
//! serialized through the Connection's own lock. Grounded on
//! `lunatic-redis::connection::ConnectionLike::req_packed_command`.

use async_trait::async_trait;

use crate::connection::SharedConnection;
use crate::error::RedisResult;
use crate::executor::Executor;
use crate::resp::Value;

pub struct DirectExecutor {
    connection: SharedConnection,
}

impl DirectExecutor {
    pub fn new(connection: SharedConnection) -> Self {
        DirectExecutor { connection }
    }

    pub fn connection(&self) -> SharedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn exec(&self, name: &str, args: Vec<Vec<u8>>) -> RedisResult<Value> {
        let mut conn = self.connection.lock().await;
        conn.command(name, &args).await
    }

    async fn close(&self) {
        let mut conn = self.connection.lock().await;
        conn.close();
    }

    fn as_direct(&self) -> Option<&DirectExecutor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{share, ConnectOpts, Connection};

    #[tokio::test]
    async fn closing_marks_connection_closed() {
        let opts = ConnectOpts::default();
        let conn = Connection::lazy(opts).unwrap();
        let shared = share(conn);
        let executor = DirectExecutor::new(shared.clone());
        executor.close().await;
        assert!(shared.lock().await.is_closed());
    }
}
