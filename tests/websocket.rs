//! Loopback tests pairing a [`WebSocketServer`] with a [`WebSocketClient`].

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{Value, json};

use reqbridge::{WebSocketClient, WebSocketServer};

use common::{free_port, init_tracing, wait_until};

const ROUTE: &str = "/test";
const LIMIT: Duration = Duration::from_secs(5);

/// Everything a client received, split by callback.
#[derive(Default)]
struct Inbox {
    text: Mutex<Vec<String>>,
    binary: Mutex<Vec<Vec<u8>>>,
    json: Mutex<Vec<Value>>,
}

impl Inbox {
    fn total(&self) -> usize {
        self.text.lock().len() + self.binary.lock().len() + self.json.lock().len()
    }
}

fn recording_client(port: u16, route: &str, inbox: &Arc<Inbox>) -> Result<WebSocketClient> {
    let text = Arc::clone(inbox);
    let binary = Arc::clone(inbox);
    let json = Arc::clone(inbox);

    let client = WebSocketClient::builder()
        .port(port)
        .route(route)
        .on_text(move |payload, _| text.text.lock().push(payload.to_string()))
        .on_binary(move |payload, _| binary.binary.lock().push(payload.to_vec()))
        .on_json(move |payload, _| json.json.lock().push(payload.clone()))
        .connect()?;
    Ok(client)
}

#[test]
fn payloads_reach_the_matching_callback() -> Result<()> {
    init_tracing();
    let port = free_port();
    let inbox = Arc::new(Inbox::default());

    // The client may come up first; it keeps dialling until the server binds.
    let client = recording_client(port, ROUTE, &inbox)?;
    let server = WebSocketServer::builder()
        .port(port)
        .route(ROUTE)
        .max_queue(4)
        .serve()?;

    server.send("hello");
    server.send(b"bytes".to_vec());
    server.send(json!({"k": "v"}));
    server.join();

    assert!(wait_until(LIMIT, || inbox.total() == 3));
    assert!(client.is_connected());
    assert!(server.is_connected());

    assert_eq!(*inbox.text.lock(), vec!["hello".to_string()]);
    assert_eq!(*inbox.binary.lock(), vec![b"bytes".to_vec()]);
    assert_eq!(*inbox.json.lock(), vec![json!({"k": "v"})]);

    client.close();
    server.close();

    Ok(())
}

#[test]
fn callbacks_can_reply_through_the_outbox() -> Result<()> {
    init_tracing();
    let server = WebSocketServer::builder()
        .route(ROUTE)
        .on_text(|text, outbox| outbox.send(format!("echo:{text}")))
        .serve()?;

    let inbox = Arc::new(Inbox::default());
    let client = recording_client(server.port(), ROUTE, &inbox)?;

    client.send("ping");
    assert!(client.join_timeout(LIMIT));

    assert!(wait_until(LIMIT, || !inbox.text.lock().is_empty()));
    assert_eq!(*inbox.text.lock(), vec!["echo:ping".to_string()]);

    Ok(())
}

#[test]
fn outbox_sends_from_another_thread() -> Result<()> {
    init_tracing();
    let server = WebSocketServer::builder().route(ROUTE).serve()?;
    let inbox = Arc::new(Inbox::default());
    let _client = recording_client(server.port(), ROUTE, &inbox)?;

    let outbox = server.outbox();
    std::thread::spawn(move || {
        for i in 0..3 {
            outbox.send(json!({"n": i}));
        }
    })
    .join()
    .unwrap();

    assert!(server.join_timeout(LIMIT));
    assert!(wait_until(LIMIT, || inbox.json.lock().len() == 3));
    assert_eq!(inbox.json.lock()[2], json!({"n": 2}));

    Ok(())
}

#[test]
fn unknown_route_is_refused() -> Result<()> {
    init_tracing();
    let server = WebSocketServer::builder().route(ROUTE).serve()?;
    let inbox = Arc::new(Inbox::default());
    let client = recording_client(server.port(), "/other", &inbox)?;

    std::thread::sleep(Duration::from_millis(300));
    assert!(!client.is_connected());
    assert!(!server.is_connected());

    client.close();
    server.close();

    Ok(())
}

#[test]
fn server_accepts_the_next_client_after_a_disconnect() -> Result<()> {
    init_tracing();
    let server = WebSocketServer::builder().route(ROUTE).serve()?;

    let first = Arc::new(Inbox::default());
    let client = recording_client(server.port(), ROUTE, &first)?;
    assert!(wait_until(LIMIT, || server.is_connected()));
    client.close();
    assert!(wait_until(LIMIT, || !server.is_connected()));

    let second = Arc::new(Inbox::default());
    let _client = recording_client(server.port(), ROUTE, &second)?;
    server.send("again");
    assert!(server.join_timeout(LIMIT));
    assert!(wait_until(LIMIT, || second.text.lock().len() == 1));
    assert!(first.text.lock().is_empty());

    Ok(())
}

#[test]
fn client_stops_queueing_after_its_session_ends() -> Result<()> {
    init_tracing();
    let server = WebSocketServer::builder().route(ROUTE).serve()?;
    let inbox = Arc::new(Inbox::default());
    let client = recording_client(server.port(), ROUTE, &inbox)?;
    assert!(wait_until(LIMIT, || client.is_connected()));

    server.close();
    assert!(wait_until(LIMIT, || client.is_closed()));
    assert!(!client.is_connected());

    client.send("after");
    assert_eq!(client.outbox().len(), 0);
    client.join();

    Ok(())
}
