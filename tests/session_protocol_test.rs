//! Session behavior over an in-memory stream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeEngine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use watchbridge::{ChangeKind, SessionSummary, WatchEngine, run_session};

struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, line: &str) {
        self.send_raw(line.as_bytes()).await;
    }

    async fn send_raw(&mut self, line: &[u8]) {
        self.writer.write_all(line).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn next_event(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("no event in time")
            .unwrap();
        line
    }
}

fn start(engine: &Arc<FakeEngine>) -> (Client, JoinHandle<SessionSummary>, CancellationToken) {
    let (client, server) = tokio::io::duplex(4096);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run_session(
        server,
        "duplex".to_string(),
        engine.clone() as Arc<dyn WatchEngine>,
        shutdown.clone(),
    ));

    let (reader, writer) = tokio::io::split(client);
    let client = Client {
        reader: BufReader::new(reader),
        writer,
    };
    (client, handle, shutdown)
}

#[tokio::test]
async fn test_file_watcher_forwards_update() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, _handle, _shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createFileWatcher","id":1,"path":"/tmp/a.txt"}"#)
        .await;
    engine.wait_for_watches(1).await;
    assert_eq!(engine.glob(0), "/tmp/a.txt");

    assert!(engine.emit(0, ChangeKind::Update, "/tmp/a.txt"));

    assert_eq!(
        client.next_event().await,
        "{\"id\":1,\"path\":\"/tmp/a.txt\",\"eventType\":\"update\"}\r\n"
    );
}

#[tokio::test]
async fn test_callback_after_close_is_not_forwarded() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, _handle, _shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createDirectoryWatcher","id":1,"path":"/src","recursive":true}"#)
        .await;
    engine.wait_for_watches(1).await;

    client
        .send(r#"{"eventName":"closeWatcher","id":1,"type":"dirRecursive"}"#)
        .await;
    engine.wait_for_disposed(1).await;

    // The session is still listening, so the late callback reaches it and must be dropped
    assert!(engine.emit(0, ChangeKind::Create, "/src/late.rs"));

    client
        .send(r#"{"eventName":"createDirectoryWatcher","id":2,"path":"/src"}"#)
        .await;
    engine.wait_for_watches(2).await;
    engine.emit(1, ChangeKind::Delete, "/src/gone.rs");

    assert_eq!(
        client.next_event().await,
        "{\"id\":2,\"path\":\"/src/gone.rs\",\"eventType\":\"delete\"}\r\n"
    );
}

#[tokio::test]
async fn test_malformed_line_keeps_session_open() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, _handle, _shutdown) = start(&engine);

    client.send("{not json").await;
    client.send(r#"{"eventName":"somethingNew","id":3}"#).await;
    client
        .send(r#"{"eventName":"createFileWatcher","id":5,"path":"/tmp/b.txt"}"#)
        .await;
    engine.wait_for_watches(1).await;
    engine.emit(0, ChangeKind::Create, "/tmp/b.txt");

    assert_eq!(
        client.next_event().await,
        "{\"id\":5,\"path\":\"/tmp/b.txt\",\"eventType\":\"create\"}\r\n"
    );
}

#[tokio::test]
async fn test_disconnect_disposes_every_subscription() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, handle, _shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createFileWatcher","id":1,"path":"/a"}"#)
        .await;
    client
        .send(r#"{"eventName":"createDirectoryWatcher","id":1,"path":"/b"}"#)
        .await;
    client
        .send(r#"{"eventName":"createDirectoryWatcher","id":2,"path":"/c","recursive":true}"#)
        .await;
    client
        .send(r#"{"eventName":"closeWatcher","id":99,"type":"file"}"#)
        .await;
    engine.wait_for_watches(3).await;

    drop(client);
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("session did not end")
        .unwrap();

    assert_eq!(summary.requests, 4);
    assert_eq!(summary.disposed, 3);
    assert_eq!(engine.disposed(), 3);

    // Callbacks after teardown go nowhere
    assert!(!engine.emit(0, ChangeKind::Update, "/a"));
}

#[tokio::test]
async fn test_shutdown_ends_session_and_disposes() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, handle, shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createFileWatcher","id":1,"path":"/a"}"#)
        .await;
    engine.wait_for_watches(1).await;

    shutdown.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("session did not stop")
        .unwrap();

    assert_eq!(summary.disposed, 1);
    assert_eq!(engine.disposed(), 1);
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_existing_watches() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, handle, _shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createFileWatcher","id":1,"path":"/tmp/a.txt"}"#)
        .await;
    client
        .send_raw(b"{\"eventName\":\"createFileWatcher\",\"id\":2,\"path\":\"/\xff\"}")
        .await;
    client
        .send(r#"{"eventName":"createFileWatcher","id":3,"path":"/tmp/c.txt"}"#)
        .await;
    engine.wait_for_watches(2).await;

    assert!(!handle.is_finished());
    assert_eq!(engine.disposed(), 0);
    assert_eq!(engine.glob(1), "/tmp/c.txt");

    engine.emit(0, ChangeKind::Update, "/tmp/a.txt");
    assert_eq!(
        client.next_event().await,
        "{\"id\":1,\"path\":\"/tmp/a.txt\",\"eventType\":\"update\"}\r\n"
    );

    drop(client);
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("session did not end")
        .unwrap();
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.disposed, 2);
}

#[tokio::test]
async fn test_events_arrive_once_in_firing_order() {
    let engine = Arc::new(FakeEngine::default());
    let (mut client, _handle, _shutdown) = start(&engine);

    client
        .send(r#"{"eventName":"createFileWatcher","id":1,"path":"/w/a.ts"}"#)
        .await;
    client
        .send(r#"{"eventName":"createDirectoryWatcher","id":2,"path":"/w/src"}"#)
        .await;
    engine.wait_for_watches(2).await;

    engine.emit(0, ChangeKind::Create, "/w/a.ts");
    engine.emit(1, ChangeKind::Create, "/w/src/b.ts");
    engine.emit(0, ChangeKind::Update, "/w/a.ts");
    engine.emit(1, ChangeKind::Delete, "/w/src/b.ts");
    engine.emit(0, ChangeKind::Delete, "/w/a.ts");

    let expected = [
        r#"{"id":1,"path":"/w/a.ts","eventType":"create"}"#,
        r#"{"id":2,"path":"/w/src/b.ts","eventType":"create"}"#,
        r#"{"id":1,"path":"/w/a.ts","eventType":"update"}"#,
        r#"{"id":2,"path":"/w/src/b.ts","eventType":"delete"}"#,
        r#"{"id":1,"path":"/w/a.ts","eventType":"delete"}"#,
    ];
    for line in expected {
        assert_eq!(client.next_event().await, format!("{line}\r\n"));
    }

    // Closing our side ends the session; nothing else was queued
    client.writer.shutdown().await.unwrap();
    assert_eq!(client.next_event().await, "");
}
