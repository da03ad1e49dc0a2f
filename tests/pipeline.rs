//! Pipeline/transaction behavior (spec.md §4.5), covering scenarios S2 and
//! S4 and invariant P3 against a canned mock server.

mod common;

use redis_driver::{Client, Value};

#[tokio::test]
async fn s2_pipeline_shape() {
    let addr = common::spawn_canned_server(vec![
        Value::SimpleString("PONG".to_string()),
        Value::SimpleString("PONG".to_string()),
        Value::SimpleString("OK".to_string()),
        Value::SimpleString("OK".to_string()),
        Value::Array(Some(vec![
            Value::BulkString(Some(b"value1".to_vec())),
            Value::BulkString(Some(b"value2".to_vec())),
        ])),
        Value::Integer(1),
        Value::Integer(1),
    ])
    .await;

    let client = Client::open(common::lazy_opts(addr)).await.unwrap();
    let pipeline = client.pipeline().unwrap();

    pipeline.send_command("PING", vec![]).await.unwrap();
    pipeline.send_command("PING", vec![]).await.unwrap();
    pipeline
        .send_command("SET", vec![b"set1".to_vec(), b"value1".to_vec()])
        .await
        .unwrap();
    pipeline
        .send_command("SET", vec![b"set2".to_vec(), b"value2".to_vec()])
        .await
        .unwrap();
    pipeline
        .send_command("MGET", vec![b"set1".to_vec(), b"set2".to_vec()])
        .await
        .unwrap();
    pipeline.send_command("DEL", vec![b"set1".to_vec()]).await.unwrap();
    pipeline.send_command("DEL", vec![b"set2".to_vec()]).await.unwrap();

    let results = pipeline.flush().await.unwrap();
    assert_eq!(results.len(), 7); // P3: flush of N=7 commands yields N results.
    assert_eq!(results[0], Value::SimpleString("PONG".to_string()));
    assert_eq!(results[2], Value::SimpleString("OK".to_string()));
    assert_eq!(
        results[4],
        Value::Array(Some(vec![
            Value::BulkString(Some(b"value1".to_vec())),
            Value::BulkString(Some(b"value2".to_vec())),
        ]))
    );
    assert_eq!(results[5], Value::Integer(1));
}

#[tokio::test]
async fn s4_pipeline_error_mid_batch_does_not_abort() {
    let addr = common::spawn_canned_server(vec![
        Value::SimpleString("OK".to_string()),
        Value::Error("ERR wrong number of arguments".to_string()),
        Value::BulkString(Some(b"a".to_vec())),
    ])
    .await;

    let client = Client::open(common::lazy_opts(addr)).await.unwrap();
    let pipeline = client.pipeline().unwrap();

    pipeline
        .send_command("SET", vec![b"a".to_vec(), b"a".to_vec()])
        .await
        .unwrap();
    pipeline
        .send_command("EVAL", vec![b"var".to_vec(), b"k".to_vec(), b"v".to_vec()])
        .await
        .unwrap();
    pipeline.send_command("GET", vec![b"a".to_vec()]).await.unwrap();

    let results = pipeline.flush().await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Value::SimpleString("OK".to_string()));
    assert!(matches!(results[1], Value::Error(_)));
    assert_eq!(results[2], Value::BulkString(Some(b"a".to_vec())));
}

#[tokio::test]
async fn send_command_resolves_to_sentinel_immediately() {
    let addr = common::spawn_canned_server(vec![Value::SimpleString("OK".to_string())]).await;
    let client = Client::open(common::lazy_opts(addr)).await.unwrap();
    let pipeline = client.pipeline().unwrap();

    let sentinel = pipeline.send_command("SET", vec![b"k".to_vec(), b"v".to_vec()]).await.unwrap();
    assert_eq!(sentinel, Value::SimpleString("OK".to_string()));

    let _ = pipeline.flush().await.unwrap();
}
