//! Tests for client sessions
//!
//! These tests verify:
//! - Request dispatch and response codes
//! - Notifications reach a subscribed session
//! - DISCONNECT and hang-up both tear the client down completely
//! - Duplicate client ids are refused
//! - A disconnected id can reconnect at once and starts fresh
//! - A malformed request ends only its own session

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pipekv::channel::NotificationChannel;
use pipekv::protocol::{
    read_notification, read_response, write_request, Notification, OpCode, Request, Response,
    ResultCode,
};
use pipekv::session::{
    Client, ClientRegistry, ClientState, Server, Session, SessionEnd, SessionHandler,
};
use pipekv::subscription::SubscriptionRegistry;
use pipekv::table::KvTable;
use pipekv::{Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Client-side ends of the three channels
struct TestClient {
    request: UnixStream,
    response: UnixStream,
    notification: UnixStream,
}

impl TestClient {
    fn send(&mut self, request: Request) {
        write_request(&mut self.request, &request).unwrap();
    }

    fn recv(&mut self) -> Response {
        read_response(&mut self.response).unwrap().unwrap()
    }

    fn call(&mut self, request: Request) -> Response {
        self.send(request);
        self.recv()
    }

    fn next_notification(&mut self) -> Option<Notification> {
        read_notification(&mut self.notification).unwrap()
    }
}

/// Server-side ends: (request reader, response writer, notification channel)
fn pipes() -> (
    TestClient,
    (UnixStream, UnixStream, Arc<NotificationChannel>),
) {
    let (req_client, req_server) = UnixStream::pair().unwrap();
    let (resp_client, resp_server) = UnixStream::pair().unwrap();
    let (notif_client, notif_server) = UnixStream::pair().unwrap();
    (
        TestClient {
            request: req_client,
            response: resp_client,
            notification: notif_client,
        },
        (req_server, resp_server, NotificationChannel::new(notif_server)),
    )
}

fn subscribe(key: &str) -> Request {
    Request::Subscribe {
        key: key.to_string(),
    }
}

fn unsubscribe(key: &str) -> Request {
    Request::Unsubscribe {
        key: key.to_string(),
    }
}

fn setup_server(max_sessions: usize) -> (TempDir, Arc<Engine>, Arc<Server>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .jobs_dir(temp_dir.path())
        .register_pipe(temp_dir.path().join("register"))
        .max_sessions(max_sessions)
        .build();
    let engine = Arc::new(Engine::open(config.clone()).unwrap());
    let server = Arc::new(Server::new(config, Arc::clone(&engine)));
    (temp_dir, engine, server)
}

fn connect(server: &Server, id: &str) -> TestClient {
    let (mut client, (req, resp, notif)) = pipes();
    assert!(server.admit(id, req, resp, notif).unwrap());
    assert_eq!(client.recv(), Response::ok(OpCode::Connect));
    client
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// Handler Tests (single thread)
// =============================================================================

#[test]
fn test_handler_scripted_session() {
    let table = Arc::new(KvTable::new());
    table.write("apple", "1");
    let subscriptions = SubscriptionRegistry::new(Arc::clone(&table));
    let clients = Arc::new(ClientRegistry::new());
    let handler = SessionHandler::new(subscriptions.clone(), Arc::clone(&clients));

    let (mut client, (req, resp, notif)) = pipes();
    let record = Client::new("c1", notif);
    assert!(clients.insert(Arc::clone(&record)));

    client.send(subscribe("apple"));
    client.send(subscribe("pear"));
    client.send(unsubscribe("pear"));
    client.send(unsubscribe("pear"));
    client.send(Request::Disconnect);

    let end = handler.handle(Session::new(Arc::clone(&record), req, resp)).unwrap();
    assert_eq!(end, SessionEnd::Disconnected);

    assert_eq!(client.recv(), Response::new(OpCode::Subscribe, ResultCode::Ok));
    assert_eq!(client.recv(), Response::new(OpCode::Subscribe, ResultCode::Failed));
    assert_eq!(client.recv(), Response::new(OpCode::Unsubscribe, ResultCode::Ok));
    assert_eq!(client.recv(), Response::new(OpCode::Unsubscribe, ResultCode::Failed));
    assert_eq!(client.recv(), Response::ok(OpCode::Disconnect));

    assert_eq!(record.state(), ClientState::Closed);
    assert!(clients.is_empty());
    assert!(subscriptions.keys_of("c1").is_empty());
    assert!(table.subscribers_of("apple").is_empty());
    assert_eq!(client.next_notification(), None);
}

#[test]
fn test_handler_hangup_cleans_up() {
    let table = Arc::new(KvTable::new());
    let subscriptions = SubscriptionRegistry::new(Arc::clone(&table));
    let clients = Arc::new(ClientRegistry::new());
    let handler = SessionHandler::new(subscriptions.clone(), Arc::clone(&clients));

    let (mut client, (req, resp, notif)) = pipes();
    let record = Client::new("c1", notif);
    clients.insert(Arc::clone(&record));

    client.send(subscribe("apple"));
    drop(client.request);

    let end = handler.handle(Session::new(record, req, resp)).unwrap();
    assert_eq!(end, SessionEnd::Hangup);
    assert!(subscriptions.keys_of("c1").is_empty());
    assert!(clients.find("c1").is_none());
}

#[test]
fn test_handler_malformed_request_drops_session() {
    let table = Arc::new(KvTable::new());
    let subscriptions = SubscriptionRegistry::new(Arc::clone(&table));
    let clients = Arc::new(ClientRegistry::new());
    let handler = SessionHandler::new(subscriptions.clone(), Arc::clone(&clients));

    let (mut client, (req, resp, notif)) = pipes();
    let record = Client::new("c1", notif);
    clients.insert(Arc::clone(&record));

    client.send(subscribe("apple"));
    client.request.write_all(b"9").unwrap();

    assert!(handler.handle(Session::new(record, req, resp)).is_err());
    assert_eq!(client.recv(), Response::new(OpCode::Subscribe, ResultCode::Failed));
    assert!(subscriptions.keys_of("c1").is_empty());
    assert!(clients.is_empty());
}

// =============================================================================
// Server Tests (worker pool)
// =============================================================================

#[test]
fn test_session_receives_notifications() {
    let (_temp, engine, server) = setup_server(2);
    let workers = server.spawn_session_workers().unwrap();
    let table = engine.table();

    let mut client = connect(&server, "c1");
    assert!(server.clients().contains("c1"));

    table.write("banana", "0");
    assert_eq!(client.call(subscribe("banana")).result, ResultCode::Ok);

    table.write("banana", "1");
    table.delete("banana");
    assert_eq!(client.next_notification(), Some(Notification::update("banana", "1")));
    assert_eq!(client.next_notification(), Some(Notification::deleted("banana")));

    assert_eq!(client.call(Request::Disconnect), Response::ok(OpCode::Disconnect));
    assert_eq!(client.next_notification(), None);
    wait_until("client removal", || server.clients().is_empty());

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_duplicate_client_id_refused() {
    let (_temp, _engine, server) = setup_server(2);
    let workers = server.spawn_session_workers().unwrap();

    let mut first = connect(&server, "same");

    let (mut second, (req, resp, notif)) = pipes();
    assert!(!server.admit("same", req, resp, notif).unwrap());
    assert_eq!(second.recv(), Response::failed(OpCode::Connect));
    assert_eq!(second.next_notification(), None);

    // The first session is unaffected.
    assert_eq!(
        first.call(subscribe("x")),
        Response::new(OpCode::Subscribe, ResultCode::Failed)
    );
    first.call(Request::Disconnect);

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_sessions_beyond_pool_wait_in_queue() {
    let (_temp, engine, server) = setup_server(1);
    let workers = server.spawn_session_workers().unwrap();
    engine.table().write("apple", "1");

    let mut first = connect(&server, "first");
    // Make sure the single worker has picked up the first session.
    assert_eq!(first.call(subscribe("apple")).result, ResultCode::Ok);

    // Queued behind the first session: admitted, but not served yet.
    let mut second = connect(&server, "second");
    assert_eq!(server.queue().len(), 1);

    first.call(Request::Disconnect);
    assert_eq!(second.call(subscribe("apple")).result, ResultCode::Ok);
    assert_eq!(engine.table().subscribers_of("apple"), vec!["second"]);
    second.call(Request::Disconnect);

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_many_clients_disconnect_cleanly() {
    let (_temp, engine, server) = setup_server(4);
    let workers = server.spawn_session_workers().unwrap();
    let table = Arc::clone(engine.table());
    table.write("zebra", "0");

    let mut clients: Vec<_> = (0..4).map(|i| connect(&server, &format!("c{}", i))).collect();
    for client in clients.iter_mut() {
        client.call(subscribe("zebra"));
    }
    assert_eq!(table.subscribers_of("zebra").len(), 4);

    table.write("zebra", "1");
    for client in clients.iter_mut() {
        assert_eq!(client.next_notification(), Some(Notification::update("zebra", "1")));
    }

    for (i, client) in clients.into_iter().enumerate() {
        if i % 2 == 0 {
            let mut client = client;
            client.call(Request::Disconnect);
        } else {
            drop(client);
        }
    }

    wait_until("all clients removed", || server.clients().is_empty());
    assert!(table.subscribers_of("zebra").is_empty());

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_same_id_reconnects_right_after_disconnect() {
    let (_temp, engine, server) = setup_server(2);
    let workers = server.spawn_session_workers().unwrap();
    engine.table().write("apple", "1");

    let mut client = connect(&server, "c1");
    for _ in 0..500 {
        assert_eq!(client.call(Request::Disconnect), Response::ok(OpCode::Disconnect));
        // connect() asserts the id is admitted again, not refused.
        client = connect(&server, "c1");
    }

    // The old sessions' teardown left the live client alone.
    assert_eq!(client.call(subscribe("apple")).result, ResultCode::Ok);
    assert!(server.clients().contains("c1"));
    assert_eq!(engine.table().subscribers_of("apple"), vec!["c1"]);

    client.call(Request::Disconnect);
    wait_until("client removal", || server.clients().is_empty());

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_reconnected_client_starts_fresh() {
    let (_temp, engine, server) = setup_server(2);
    let workers = server.spawn_session_workers().unwrap();
    let table = engine.table();
    table.write("banana", "0");

    let mut old = connect(&server, "c1");
    assert_eq!(old.call(subscribe("banana")).result, ResultCode::Ok);
    assert_eq!(old.call(Request::Disconnect), Response::ok(OpCode::Disconnect));
    assert_eq!(old.next_notification(), None);
    assert!(engine.subscriptions().keys_of("c1").is_empty());

    let mut new = connect(&server, "c1");
    assert!(engine.subscriptions().keys_of("c1").is_empty());
    assert_eq!(new.call(subscribe("banana")).result, ResultCode::Ok);
    assert_eq!(table.subscribers_of("banana"), vec!["c1"]);

    table.write("banana", "1");
    assert_eq!(new.next_notification(), Some(Notification::update("banana", "1")));

    new.call(Request::Disconnect);
    wait_until("client removal", || server.clients().is_empty());
    assert!(table.subscribers_of("banana").is_empty());

    server.queue().close();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_stale_detach_keeps_newer_client() {
    let clients = ClientRegistry::new();

    let (_old_client, (_, _, old_notif)) = pipes();
    let old = Client::new("c1", old_notif);
    let (_new_client, (_, _, new_notif)) = pipes();
    let new = Client::new("c1", new_notif);

    assert!(clients.insert(Arc::clone(&old)));
    assert!(clients.detach(&old));
    assert!(clients.insert(Arc::clone(&new)));

    // Detaching the old record again must not evict the new one.
    assert!(!clients.detach(&old));
    assert!(Arc::ptr_eq(&clients.find("c1").unwrap(), &new));
}
