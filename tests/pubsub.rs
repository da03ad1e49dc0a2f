//! Pub/Sub close behavior (spec.md §4.6), covering scenario S5: a consumer
//! iterating `receive()` while the client closes must observe the stream
//! terminate cleanly, with no error raised.

mod common;

use futures::StreamExt;
use redis_driver::{Client, Value};

#[tokio::test]
async fn s5_subscription_closes_silently() {
    let addr = common::spawn_canned_server(vec![
        Value::Array(Some(vec![
            Value::BulkString(Some(b"subscribe".to_vec())),
            Value::BulkString(Some(b"chan1".to_vec())),
            Value::Integer(1),
        ])),
        Value::Array(Some(vec![
            Value::BulkString(Some(b"unsubscribe".to_vec())),
            Value::BulkString(Some(b"chan1".to_vec())),
            Value::Integer(0),
        ])),
    ])
    .await;

    let sub = Client::subscribe(common::lazy_opts(addr), &["chan1"]).await.unwrap();
    let mut stream = sub.receive();

    sub.close().await;
    assert!(sub.is_closed().await);

    // The stream must end (yield None) rather than panic or block forever.
    let next = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next()).await;
    assert!(next.is_ok());
}
