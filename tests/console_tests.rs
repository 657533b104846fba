// ABOUTME: Tests for the console space and a full engine run over in-memory streams.
// ABOUTME: Input lines become direct messages; replies are written one per line.

use shelly::console::{ConsoleSpace, CONSOLE_ROOM};
use shelly_core::channels::{Inbound, Reply};
use shelly_core::{Context, Engine, Space};
use std::io::Cursor;
use std::sync::Arc;

#[tokio::test]
async fn test_lines_become_direct_messages() {
    let space = ConsoleSpace::new(Cursor::new(b"version\necho hi\n".to_vec()), Vec::new());

    let first = space.receive().await.unwrap().unwrap();
    let Inbound::Payload(payload) = first else {
        panic!("expected a payload, got {:?}", first);
    };
    assert_eq!(payload["text"], "version");
    assert_eq!(payload["room_id"], CONSOLE_ROOM);
    assert_eq!(payload["room_type"], "direct");
    assert_eq!(payload["id"], "console-1");

    assert!(space.receive().await.unwrap().is_some());
    assert!(space.receive().await.unwrap().is_none());
}

#[tokio::test]
async fn test_replies_are_printed() {
    let space = ConsoleSpace::new(Cursor::new(Vec::new()), Vec::new());
    space.send(&Reply::text("plain")).await.unwrap();
    space
        .send(&Reply::text("fallback").with_markdown("**bold**").with_file("a.txt"))
        .await
        .unwrap();

    let output = String::from_utf8(space.into_output()).unwrap();
    assert_eq!(output, "plain\n**bold**\n[file: a.txt]\n");
}

#[tokio::test]
async fn test_engine_runs_over_console() {
    let space = Arc::new(ConsoleSpace::new(
        Cursor::new(b"version\necho hello there\n".to_vec()),
        Vec::new(),
    ));
    let engine = Arc::new(Engine::new(Context::new().unwrap(), space.clone()));
    engine
        .configure(&serde_json::json!({"bot": {"version": "0.1.0"}}))
        .unwrap();

    engine.run().await.unwrap();
    drop(engine);

    let space = Arc::try_unwrap(space).ok().expect("engine still holds the space");
    let output = String::from_utf8(space.into_output()).unwrap();
    assert_eq!(output, "Shelly version 0.1.0\nhello there\n");
}
