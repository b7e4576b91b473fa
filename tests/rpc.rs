//! End-to-end request/response and messaging over real TCP.

use std::sync::Arc;
use std::time::Duration;

use monte::config::ServerConfig;
use monte::{Echo, Error};
use monte::error::TimeoutKind;

mod common;

use common::{client_for, start_server, Recorder};

#[tokio::test]
async fn request_round_trips_through_echo_server() {
    let server = start_server(ServerConfig::default(), Echo).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let response = conn
        .request(b"ping", Vec::with_capacity(64), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response, b"ping");
    assert_eq!(conn.pending_requests(), 0);

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_get_their_own_responses() {
    let server = start_server(ServerConfig::default(), Echo).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..64u32 {
        let conn = Arc::clone(conn.conn());
        tasks.push(tokio::spawn(async move {
            let payload = format!("request-{i}").into_bytes();
            let response = conn
                .request(&payload, Vec::with_capacity(64), Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(response, payload);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(conn.pending_requests(), 0);

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn messages_arrive_in_enqueue_order() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    for i in 0..500u32 {
        conn.write_no_wait(&i.to_be_bytes()).unwrap();
    }
    recorder.wait_for_messages(500).await;

    let received: Vec<u32> = recorder
        .messages()
        .iter()
        .map(|m| u32::from_be_bytes([m[0], m[1], m[2], m[3]]))
        .collect();
    assert_eq!(received, (0..500).collect::<Vec<_>>());

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn concurrent_writers_keep_per_writer_order() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let mut tasks = Vec::new();
    for writer in 0..8u8 {
        let conn = Arc::clone(conn.conn());
        tasks.push(tokio::spawn(async move {
            for n in 0..50u8 {
                conn.write(&[writer, n]).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    recorder.wait_for_messages(400).await;

    let messages = recorder.messages();
    for writer in 0..8u8 {
        let seen: Vec<u8> = messages
            .iter()
            .filter(|m| m[0] == writer)
            .map(|m| m[1])
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>(), "writer {writer}");
    }

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn messages_never_create_pending_requests() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    for _ in 0..20 {
        conn.write(b"fire").await.unwrap();
        assert_eq!(conn.pending_requests(), 0);
    }
    recorder.wait_for_messages(20).await;
    assert_eq!(recorder.requests(), 0);

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn unanswered_request_times_out_and_is_forgotten() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let err = conn
        .request(b"hello?", Vec::with_capacity(16), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(TimeoutKind::Request)));
    assert_eq!(conn.pending_requests(), 0);
    assert_eq!(recorder.requests(), 1);

    // The connection stays usable.
    conn.write(b"still here").await.unwrap();
    recorder.wait_for_messages(1).await;

    conn.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn oversized_payload_is_rejected_before_sending() {
    let server = start_server(ServerConfig::default(), Echo).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let too_big = vec![0u8; 16 * 1024];
    assert!(matches!(conn.write(&too_big).await, Err(Error::Framing(_))));

    // Nothing was queued; the connection still works.
    let response = conn
        .request(b"ok", Vec::with_capacity(8), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response, b"ok");

    conn.close().await.unwrap();
    server.server.shutdown().await;
}
