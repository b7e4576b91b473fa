//! Admission control and graceful shutdown over real TCP.

use std::time::Duration;

use monte::config::ServerConfig;
use monte::{Echo, Error};

mod common;

use common::{client_for, eventually, start_server, Recorder};

#[tokio::test]
async fn connection_over_limit_is_rejected() {
    let config = ServerConfig {
        max_connections: 1,
        max_conn_wait_timeout_ms: 100,
        ..ServerConfig::default()
    };
    let server = start_server(config, Echo).await;
    let client = client_for(server.addr);

    let first = client.connect(Echo).await.unwrap();
    first
        .request(b"hold", Vec::with_capacity(8), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(server.server.available_slots(), 0);

    // The server closes the raw stream mid-handshake.
    let err = client.connect(Echo).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {err}");

    // Once the slot frees, new connections are admitted again.
    first.close().await.unwrap();
    eventually(|| server.server.available_slots() == 1).await;
    let second = client.connect(Echo).await.unwrap();
    let response = second
        .request(b"again", Vec::with_capacity(8), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response, b"again");

    second.close().await.unwrap();
    server.server.shutdown().await;
}

#[tokio::test]
async fn waiting_connection_gets_freed_slot() {
    let config = ServerConfig {
        max_connections: 1,
        max_conn_wait_timeout_ms: 5_000,
        ..ServerConfig::default()
    };
    let server = start_server(config, Echo).await;
    let client = client_for(server.addr);

    let first = client.connect(Echo).await.unwrap();
    first
        .request(b"hold", Vec::with_capacity(8), Duration::from_secs(2))
        .await
        .unwrap();

    let waiting = tokio::spawn({
        let addr = server.addr;
        async move {
            let client = client_for(addr);
            let conn = client.connect(Echo).await?;
            let response = conn
                .request(b"queued", Vec::with_capacity(8), Duration::from_secs(2))
                .await?;
            conn.close().await?;
            Ok::<_, Error>(response)
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    first.close().await.unwrap();

    let response = waiting.await.unwrap().unwrap();
    assert_eq!(response, b"queued");
    server.server.shutdown().await;
}

#[tokio::test]
async fn shutdown_waits_for_connections_and_stops_accepting() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);

    let mut conns = Vec::new();
    for _ in 0..3 {
        let conn = client.connect(Echo).await.unwrap();
        conn.write(b"hello").await.unwrap();
        conns.push(conn);
    }
    recorder.wait_for_messages(3).await;
    assert_eq!(server.server.active_connections(), 3);

    tokio::time::timeout(Duration::from_secs(5), server.server.shutdown())
        .await
        .unwrap();
    assert_eq!(server.server.active_connections(), 0);
    server.task.await.unwrap().unwrap();

    // Every client sees its connection end cleanly.
    for conn in conns {
        conn.join().await.unwrap();
    }

    // The listener is gone with the accept loop.
    assert!(client.connect(Echo).await.is_err());

    // Idempotent.
    server.server.shutdown().await;
}

#[tokio::test]
async fn server_shutdown_fails_outstanding_requests() {
    let recorder = Recorder::default();
    let server = start_server(ServerConfig::default(), recorder.clone()).await;
    let client = client_for(server.addr);
    let conn = client.connect(Echo).await.unwrap();

    let pending = {
        let conn = std::sync::Arc::clone(conn.conn());
        tokio::spawn(async move {
            conn.request(b"never answered", Vec::with_capacity(32), Duration::from_secs(30))
                .await
        })
    };
    eventually(|| recorder.requests() == 1).await;

    server.server.shutdown().await;

    let err = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::Closed));
    assert_eq!(conn.pending_requests(), 0);
}

#[tokio::test]
async fn client_shutdown_closes_all_connections() {
    let server = start_server(ServerConfig::default(), Echo).await;
    let client = client_for(server.addr);

    let a = client.connect(Echo).await.unwrap();
    let b = client.connect(Echo).await.unwrap();
    assert_eq!(client.active_connections(), 2);

    tokio::time::timeout(Duration::from_secs(5), client.shutdown())
        .await
        .unwrap();
    assert_eq!(client.active_connections(), 0);
    assert!(matches!(a.write(b"late").await, Err(Error::Shutdown)));
    a.join().await.unwrap();
    b.join().await.unwrap();

    assert!(matches!(client.connect(Echo).await, Err(Error::Shutdown)));

    eventually(|| server.server.active_connections() == 0).await;
    server.server.shutdown().await;
}
