// ABOUTME: Tests for the inbound worker - classification, triggers, fan relay and lifecycle.
// ABOUTME: Drives a Listener directly against an Engine backed by a LocalSpace.

use serde_json::json;
use shelly_core::channels::Inbound;
use shelly_core::{BotError, Context, Engine, Event, EventName, FnSubscriber, Listener, LocalSpace};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

fn message(room_id: &str, text: &str) -> Inbound {
    Inbound::Payload(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "room_id": room_id,
        "text": text,
        "from_id": "user-1",
    }))
}

fn engine() -> (Arc<Engine>, Arc<LocalSpace>) {
    let space = Arc::new(LocalSpace::new());
    let engine = Arc::new(Engine::new(Context::new().unwrap(), space.clone()));
    (engine, space)
}

fn record(engine: &Engine, names: &[EventName]) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in names {
        let seen = Arc::clone(&seen);
        engine
            .subscribe(
                name.clone(),
                Arc::new(FnSubscriber::new(move |event: &EventName, _| {
                    seen.lock().unwrap().push(event.to_string());
                    Ok(())
                })),
            )
            .unwrap();
    }
    seen
}

#[tokio::test]
async fn test_version_then_sentinel_replies_once() {
    let (engine, space) = engine();
    engine.start().unwrap();

    let (tx, rx) = mpsc::channel(8);
    tx.send(message("room-1", "shelly version")).await.unwrap();
    tx.send(Inbound::Sentinel).await.unwrap();
    tx.send(message("room-1", "shelly version")).await.unwrap();

    let listener = Listener::new(Arc::clone(&engine));
    timeout(
        Duration::from_secs(2),
        listener.run(rx, CancellationToken::new()),
    )
    .await
    .expect("listener did not stop on sentinel");

    assert!(space.wait_for_sent(1, Duration::from_secs(2)).await);
    engine.stop().await.unwrap();

    assert_eq!(space.sent_texts(), vec!["Shelly version *unknown*"]);
    assert_eq!(space.sent()[0].room_id.as_deref(), Some("room-1"));
    assert_eq!(engine.context().get_i64("listener.counter"), Some(1));
}

#[tokio::test]
async fn test_filter_can_interrupt_the_loop() {
    let (engine, space) = engine();
    engine.set("general.switch", "on").unwrap();
    engine.set_filter(|event: Event| {
        if event.text == "halt" {
            Err(BotError::Interrupted)
        } else {
            Ok(event)
        }
    });

    let (tx, rx) = mpsc::channel(8);
    tx.send(message("room-1", "hello there")).await.unwrap();
    tx.send(message("room-1", "halt")).await.unwrap();
    tx.send(message("room-1", "shelly version")).await.unwrap();

    let listener = Listener::new(Arc::clone(&engine));
    timeout(
        Duration::from_secs(2),
        listener.run(rx, CancellationToken::new()),
    )
    .await
    .expect("listener did not stop on interruption");

    assert_eq!(engine.context().get_i64("listener.counter"), Some(2));
    assert!(space.sent().is_empty());
}

#[tokio::test]
async fn test_filter_can_rewrite_events() {
    let (engine, space) = engine();
    engine.start().unwrap();

    let listener = Listener::new(Arc::clone(&engine)).with_filter(|mut event: Event| {
        event.text = event.text.replace("please ", "");
        Ok(event)
    });
    listener
        .process(message("room-1", "shelly please echo hi"))
        .await
        .unwrap();

    assert!(space.wait_for_sent(1, Duration::from_secs(2)).await);
    engine.stop().await.unwrap();
    assert_eq!(space.sent_texts(), vec!["hi"]);
}

#[tokio::test]
async fn test_loop_stops_when_switched_off() {
    let (engine, _space) = engine();
    engine.set("general.switch", "on").unwrap();

    let (_tx, rx) = mpsc::channel(8);
    let listener = Listener::new(Arc::clone(&engine));
    let handle = tokio::spawn(async move { listener.run(rx, CancellationToken::new()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.set("general.switch", "off").unwrap();

    timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener ignored the switch")
        .unwrap();
}

#[tokio::test]
async fn test_loop_stops_on_cancellation() {
    let (engine, _space) = engine();
    engine.set("general.switch", "on").unwrap();

    let (_tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let listener = Listener::new(Arc::clone(&engine));
    let token = cancel.clone();
    let handle = tokio::spawn(async move { listener.run(rx, token).await });

    cancel.cancel();
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener ignored cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_malformed_items_are_counted_and_reported() {
    let (engine, _space) = engine();
    let listener = Listener::new(Arc::clone(&engine));

    let err = listener
        .process(Inbound::Text("this is not json".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::MalformedPayload(_)));

    let err = listener
        .process(Inbound::Payload(json!({"text": "no identity"})))
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::MalformedPayload(_)));

    assert_eq!(engine.context().get_i64("listener.counter"), Some(2));
}

#[tokio::test]
async fn test_sentinel_is_not_counted() {
    let (engine, _space) = engine();
    let listener = Listener::new(Arc::clone(&engine));

    let err = listener.process(Inbound::Sentinel).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(engine.context().get_i64("listener.counter"), None);
}

#[tokio::test]
async fn test_serialized_items_are_parsed() {
    let (engine, _space) = engine();
    let seen = record(&engine, &[EventName::Inbound]);
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Text(
            r#"{"id": "42", "room_id": "room-1", "colour": "red"}"#.to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["inbound"]);
}

#[tokio::test]
async fn test_handlers_check_event_kind() {
    let (engine, _space) = engine();
    let listener = Listener::new(Arc::clone(&engine));
    let event = Event::message("room-1", "hello");

    assert!(matches!(
        listener.on_attachment(&event),
        Err(BotError::WrongEventKind { expected: "attachment", actual: "message" })
    ));
    assert!(matches!(
        listener.on_join(&event).await,
        Err(BotError::WrongEventKind { expected: "join", .. })
    ));
    assert!(matches!(
        listener.on_leave(&event).await,
        Err(BotError::WrongEventKind { expected: "leave", .. })
    ));
    assert!(matches!(
        listener.on_inbound(&event),
        Err(BotError::WrongEventKind { expected: "event", .. })
    ));

    let join = Event::from_value(json!({"id": "1", "room_id": "r", "actor_id": "a"})).unwrap();
    assert!(matches!(
        listener.on_message(&join, &Inbound::Sentinel).await,
        Err(BotError::WrongEventKind { expected: "message", actual: "join" })
    ));
}

#[tokio::test]
async fn test_every_message_is_dispatched() {
    let (engine, _space) = engine();
    let seen = record(&engine, &[EventName::Message, EventName::Attachment]);
    let listener = Listener::new(Arc::clone(&engine));

    listener.process(message("room-1", "just chatting")).await.unwrap();
    listener
        .process(Inbound::Payload(json!({
            "id": "2", "room_id": "room-1", "url": "http://files/report.pdf"
        })))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["message", "attachment"]);
}

#[tokio::test]
async fn test_membership_of_others_is_join_and_leave() {
    let (engine, _space) = engine();
    engine.set("bot.id", "bot-1").unwrap();
    let seen = record(
        &engine,
        &[EventName::Join, EventName::Leave, EventName::Enter, EventName::Exit],
    );
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Payload(json!({
            "id": "1", "room_id": "room-1", "actor_id": "user-7"
        })))
        .await
        .unwrap();
    listener
        .process(Inbound::Payload(json!({
            "id": "2", "room_id": "room-1", "actor_id": "user-7", "membership": "leave"
        })))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["join", "leave"]);
    assert!(engine.enumerate_bots().is_empty());
}

#[tokio::test]
async fn test_bot_membership_is_enter_and_exit() {
    let (engine, space) = engine();
    engine
        .configure(&json!({"bot": {"id": "bot-1", "on_enter": "Hello, I am here!"}}))
        .unwrap();
    let seen = record(
        &engine,
        &[
            EventName::Bond,
            EventName::Enter,
            EventName::Exit,
            EventName::Dispose,
            EventName::Join,
        ],
    );
    engine.start().unwrap();
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Payload(json!({
            "id": "1", "room_id": "room-1", "actor_id": "bot-1"
        })))
        .await
        .unwrap();
    assert_eq!(engine.enumerate_bots(), vec!["room-1"]);
    assert!(space.wait_for_sent(1, Duration::from_secs(2)).await);

    listener
        .process(Inbound::Payload(json!({
            "id": "2", "room_id": "room-1", "actor_id": "bot-1", "membership": "leave"
        })))
        .await
        .unwrap();
    assert!(engine.enumerate_bots().is_empty());

    engine.stop().await.unwrap();
    assert_eq!(space.sent_texts(), vec!["Hello, I am here!"]);
    assert_eq!(*seen.lock().unwrap(), vec!["bond", "enter", "exit", "dispose"]);
}

#[tokio::test]
async fn test_mention_with_empty_text_shows_help() {
    let (engine, space) = engine();
    engine.set("bot.id", "bot-1").unwrap();
    engine.start().unwrap();
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Payload(json!({
            "id": "1", "room_id": "room-1", "text": "", "mentioned_ids": ["bot-1"]
        })))
        .await
        .unwrap();

    assert!(space.wait_for_sent(1, Duration::from_secs(2)).await);
    engine.stop().await.unwrap();
    assert!(space.sent_texts()[0].starts_with("Available commands:"));
}

#[tokio::test]
async fn test_direct_room_needs_no_prefix() {
    let (engine, space) = engine();
    engine.start().unwrap();
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Payload(json!({
            "id": "1", "room_id": "room-1", "room_type": "direct", "text": "echo private"
        })))
        .await
        .unwrap();

    assert!(space.wait_for_sent(1, Duration::from_secs(2)).await);
    engine.stop().await.unwrap();
    assert_eq!(space.sent_texts(), vec!["private"]);
}

#[tokio::test]
async fn test_own_messages_do_not_trigger_commands() {
    let (engine, space) = engine();
    engine.set("bot.id", "bot-1").unwrap();
    let seen = record(&engine, &[EventName::Message]);
    engine.start().unwrap();
    let listener = Listener::new(Arc::clone(&engine));

    listener
        .process(Inbound::Payload(json!({
            "id": "1", "room_id": "room-1", "text": "shelly version", "from_id": "bot-1"
        })))
        .await
        .unwrap();

    engine.stop().await.unwrap();
    assert!(space.sent().is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["message"]);
}

#[tokio::test]
async fn test_fan_relays_ordinary_messages_only() {
    let (engine, _space) = engine();
    engine.set("bot.id", "bot-1").unwrap();
    let listener = Listener::new(Arc::clone(&engine));
    let (fan_tx, mut fan_rx) = mpsc::channel(8);

    // No fan yet
    listener.process(message("room-1", "before the fan")).await.unwrap();
    assert!(fan_rx.try_recv().is_err());

    engine.enable_fan(fan_tx).unwrap();
    assert!(engine.context().has("fan.stamp"));

    let ordinary = message("room-1", "hello everybody");
    listener.process(ordinary.clone()).await.unwrap();
    listener
        .process(Inbound::Payload(json!({
            "id": "9", "room_id": "room-1", "text": "from myself", "from_id": "bot-1"
        })))
        .await
        .unwrap();

    assert_eq!(fan_rx.try_recv().unwrap(), ordinary);
    assert!(fan_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_fan_needs_stamp() {
    let (engine, _space) = engine();
    let listener = Listener::new(Arc::clone(&engine));
    let (fan_tx, mut fan_rx) = mpsc::channel(8);

    engine.enable_fan(fan_tx).unwrap();
    engine.context().clear().unwrap();
    assert!(!engine.context().has("fan.stamp"));

    listener.process(message("room-1", "hello")).await.unwrap();
    assert!(fan_rx.try_recv().is_err());
}
