//! Cluster redirection behavior (spec.md §4.7), covering scenario S6.

mod common;

use redis_driver::cluster::{ClusterConfig, ClusterDispatcher};
use redis_driver::Value;

#[tokio::test]
async fn s6_moved_redirection_is_followed() {
    let target = common::spawn_canned_server(vec![Value::BulkString(Some(b"value".to_vec()))]).await;
    let seed = common::spawn_moved_server(0, target).await;

    let base_opts = common::lazy_opts(seed);
    let config = ClusterConfig {
        seeds: vec![base_opts.addr()],
        max_redirections: 16,
    };
    let dispatcher = ClusterDispatcher::new(config, base_opts);

    let reply = dispatcher
        .exec("GET", vec![b"foo".to_vec()], &[b"foo".as_slice()])
        .await
        .unwrap();
    assert_eq!(reply, Value::BulkString(Some(b"value".to_vec())));
}

#[tokio::test]
async fn cross_slot_keys_fail_without_any_network_use() {
    let config = ClusterConfig {
        seeds: vec![],
        max_redirections: 16,
    };
    let dispatcher = ClusterDispatcher::new(config, redis_driver::connection::ConnectOpts::default());

    let err = dispatcher
        .exec(
            "MGET",
            vec![b"{a}x".to_vec(), b"{b}y".to_vec()],
            &[b"{a}x".as_slice(), b"{b}y".as_slice()],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), redis_driver::ErrorKind::CrossSlot);
}
