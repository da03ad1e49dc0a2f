//! A minimal canned-reply mock server shared by the integration tests.
//! Accepts one connection, reads and discards one request frame per
//! configured reply, and writes the reply back — enough to drive the
//! Connection/executor layers without a real Redis server.

use redis_driver::resp;
use redis_driver::Value;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub async fn spawn_canned_server(replies: Vec<Value>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else { return };
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        for reply in replies {
            if resp::read_reply_or_value(&mut reader).await.is_err() {
                break;
            }
            let mut buf = Vec::new();
            resp::encode_value(&mut buf, &reply);
            if writer.write_all(&buf).await.is_err() {
                break;
            }
        }
    });
    addr
}

/// Reads one request, replies `-MOVED <slot> <redirect_addr>`, then closes.
pub async fn spawn_moved_server(slot: u16, redirect_addr: std::net::SocketAddr) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else { return };
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        if resp::read_reply_or_value(&mut reader).await.is_err() {
            return;
        }
        let mut buf = Vec::new();
        resp::encode_value(
            &mut buf,
            &Value::Error(format!("MOVED {slot} {redirect_addr}")),
        );
        let _ = writer.write_all(&buf).await;
    });
    addr
}

pub fn lazy_opts(addr: std::net::SocketAddr) -> redis_driver::connection::ConnectOpts {
    redis_driver::connection::ConnectOpts {
        hostname: addr.ip().to_string(),
        port: addr.port(),
        tls: false,
        db: 0,
        name: None,
        password: None,
        max_retry_count: 1,
    }
}
