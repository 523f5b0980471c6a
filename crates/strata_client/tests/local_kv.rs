//! Typed wrapper tests against the in-process store.

mod common;

use std::sync::Arc;

use strata_client::{Client, Clock, LocalSender, ManualClock, TransactionOptions};
use strata_proto::{Error, Timestamp};

#[derive(Clone, PartialEq, prost::Message)]
struct ZoneConfig {
    #[prost(string, tag = "1")]
    region: String,
    #[prost(int64, tag = "2")]
    replicas: i64,
}

fn local_client() -> (Client, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let routing = Arc::new(LocalSender::new(clock.clone() as Arc<dyn Clock>));
    (Client::new(routing, clock.clone()), clock)
}

#[tokio::test]
async fn bytes_round_trip_with_write_timestamp() {
    let (client, clock) = local_client();
    client.put_bytes(b"greeting", &b"hello"[..]).await.unwrap();
    clock.advance(500);

    let (bytes, timestamp) = client.get_bytes(b"greeting").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"hello");
    assert_eq!(timestamp, Timestamp::new(1_000_000, 0));
}

#[tokio::test]
async fn absent_keys_are_not_errors() {
    let (client, _clock) = local_client();
    assert_eq!(client.get_bytes(b"nothing").await.unwrap(), None);

    let mut msg = ZoneConfig::default();
    let (found, timestamp) = client.get_message(b"nothing", &mut msg).await.unwrap();
    assert!(!found);
    assert_eq!(timestamp, Timestamp::zero());
    assert!(!client.contains(b"nothing").await.unwrap());
}

#[tokio::test]
async fn message_round_trip() {
    let (client, _clock) = local_client();
    let config = ZoneConfig {
        region: "eu-west".to_string(),
        replicas: 3,
    };
    client.put_message(b"zone/eu", &config).await.unwrap();

    let mut read = ZoneConfig::default();
    let (found, timestamp) = client.get_message(b"zone/eu", &mut read).await.unwrap();
    assert!(found);
    assert!(!timestamp.is_zero());
    assert_eq!(read, config);
}

#[tokio::test]
async fn decode_failure_carries_the_recovered_timestamp() {
    let (client, _clock) = local_client();
    client
        .put_bytes(b"zone/bad", &[0xff, 0xff, 0xff][..])
        .await
        .unwrap();

    let mut msg = ZoneConfig::default();
    let err = client.get_message(b"zone/bad", &mut msg).await.unwrap_err();
    match err {
        Error::Decode { timestamp, .. } => assert_eq!(timestamp, Timestamp::new(1_000_000, 0)),
        other => panic!("expected decode error, got {other}"),
    }
}

#[tokio::test]
async fn integer_values_refuse_the_byte_accessor() {
    let (client, _clock) = local_client();
    client.increment(b"counter", 5).await.unwrap();

    let err = client.get_bytes(b"counter").await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedValueType { .. }));
}

#[tokio::test]
async fn increment_accumulates_and_goes_negative() {
    let (client, _clock) = local_client();
    assert_eq!(client.increment(b"counter", 10).await.unwrap(), 10);
    assert_eq!(client.increment(b"counter", -3).await.unwrap(), 7);
    assert_eq!(client.increment(b"counter", -10).await.unwrap(), -3);
}

#[tokio::test]
async fn scan_respects_bounds_and_limits() {
    let (client, _clock) = local_client();
    for key in [b"row/a", b"row/b", b"row/c", b"row/d"] {
        client.put_bytes(key, &key[..]).await.unwrap();
    }

    let rows = client.scan(b"row/a", b"row/d", 0).await.unwrap();
    assert_eq!(
        rows.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>(),
        vec![b"row/a".to_vec(), b"row/b".to_vec(), b"row/c".to_vec()]
    );

    let limited = client.scan(b"row/a", b"row/z", 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn delete_range_reports_how_many_rows_died() {
    let (client, _clock) = local_client();
    for key in [b"gc/a", b"gc/b", b"gc/c"] {
        client.put_bytes(key, &b"x"[..]).await.unwrap();
    }

    let deleted = client.delete_range(b"gc/a", b"gc/c").await.unwrap();
    assert_eq!(deleted, 2);
    assert!(!client.contains(b"gc/a").await.unwrap());
    assert!(client.contains(b"gc/c").await.unwrap());

    client.delete(b"gc/c").await.unwrap();
    assert!(!client.contains(b"gc/c").await.unwrap());
}

#[tokio::test]
async fn transactions_commit_through_the_local_store() {
    let (client, _clock) = local_client();

    client
        .run_transaction(
            TransactionOptions {
                name: "setup".to_string(),
                ..TransactionOptions::default()
            },
            |txn| async move {
                txn.put_bytes(b"acct/alice", &b"100"[..]).await?;
                txn.increment(b"acct/count", 1).await?;
                Ok(())
            },
        )
        .await
        .unwrap();

    let (bytes, _) = client.get_bytes(b"acct/alice").await.unwrap().unwrap();
    assert_eq!(&bytes[..], b"100");
    assert_eq!(client.increment(b"acct/count", 0).await.unwrap(), 1);
}
