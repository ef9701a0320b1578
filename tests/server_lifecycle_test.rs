// Integration tests for the server agent's lifecycle.
//
// These tests verify that:
// 1. The listener only opens once the config gate is published
// 2. A bind failure leaves the server inert instead of crashing
// 3. Workers survive misbehaving peers and keep accepting
// 4. A long-lived connection on one worker does not block the others
// 5. Shutdown unblocks every worker parked in accept, even one that is
//    just finishing a read

use std::cell::RefCell;
use std::io::Write;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tcpchat::{Agent, ConfigGate, IpConfig, TcpServerAgent, WorkerState};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn server_config(port: u16, workers: usize) -> IpConfig {
    IpConfig {
        name: "Hub".to_string(),
        server_address: "127.0.0.1".to_string(),
        server_port: port,
        server_client_count: workers,
        ..IpConfig::default()
    }
}

fn record(agent: &mut impl Agent) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    agent.subscribe(move |msg| sink.borrow_mut().push(msg.to_string()));
    seen
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn send_raw(port: u16, bytes: &[u8]) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(bytes).unwrap();
}

#[test]
fn test_listener_opens_only_after_publish() {
    let port = free_port();
    let gate = ConfigGate::new();
    let mut server = TcpServerAgent::new(gate.clone());

    server.tick();
    assert!(!server.is_listening());
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());

    gate.publish(server_config(port, 2)).unwrap();
    server.tick();
    assert!(server.is_loaded());
    assert!(server.is_listening());
    assert_eq!(server.local_addr().unwrap().port(), port);
    assert_eq!(server.config().unwrap().expected_clients, 2);
}

#[test]
fn test_bind_failure_leaves_server_inert() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 3)).unwrap());
    assert_eq!(server.tick(), 0);

    assert!(server.is_loaded(), "config is loaded even though bind failed");
    assert!(!server.is_listening());
    assert!(server.worker_states().is_empty());
    assert_eq!(server.active_workers(), 0);

    // Still safe to tick and shut down.
    assert_eq!(server.tick(), 0);
    server.shutdown();
}

#[test]
fn test_spawns_expected_worker_count() {
    let port = free_port();
    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 4)).unwrap());
    server.tick();

    assert!(wait_for(Duration::from_secs(2), || {
        server.worker_states().iter().all(|s| *s == WorkerState::Accepting)
    }));
    assert_eq!(server.worker_states().len(), 4);
    assert_eq!(server.active_workers(), 4);
}

#[test]
fn test_worker_survives_abrupt_disconnect() {
    let port = free_port();
    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 1)).unwrap());
    let received = record(&mut server);
    server.tick();

    // Connect and vanish without sending anything.
    drop(TcpStream::connect(("127.0.0.1", port)).unwrap());
    // Send half of a two-byte character, then vanish.
    send_raw(port, &[0xc3]);

    send_raw(port, b"still alive");

    assert!(wait_for(Duration::from_secs(5), || {
        server.tick();
        received.borrow().iter().any(|m| m == "still alive")
    }));
    assert_eq!(server.active_workers(), 1);
    assert!(received.borrow().iter().any(|m| m == "\u{FFFD}"));
}

#[test]
fn test_open_connection_does_not_block_other_workers() {
    let port = free_port();
    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 2)).unwrap());
    let received = record(&mut server);
    server.tick();

    // Occupies one worker until it closes.
    let mut lingering = TcpStream::connect(("127.0.0.1", port)).unwrap();
    lingering.write_all(b"Slow#part one").unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        server.tick();
        received.borrow().len() == 1
    }));

    send_raw(port, b"Fast#hello");
    assert!(wait_for(Duration::from_secs(5), || {
        server.tick();
        received.borrow().iter().any(|m| m == "Fast#hello")
    }));

    lingering.shutdown(Shutdown::Both).unwrap();
    assert_eq!(received.borrow()[0], "Slow#part one");
}

#[test]
fn test_shutdown_releases_every_worker() {
    let port = free_port();
    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 3)).unwrap());
    server.tick();

    assert!(wait_for(Duration::from_secs(2), || {
        server.worker_states().iter().all(|s| *s == WorkerState::Accepting)
    }));

    server.shutdown();
    assert!(!server.is_listening());

    assert!(
        wait_for(Duration::from_secs(2), || server.active_workers() == 0),
        "workers still running: {:?}",
        server.worker_states()
    );
    assert!(server.worker_states().iter().all(|s| *s == WorkerState::Stopped));

    // Second shutdown is a no-op.
    server.shutdown();
}

#[test]
fn test_shutdown_waits_for_no_reader() {
    let port = free_port();
    let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 2)).unwrap());
    server.tick();

    let reader_peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        server.worker_states().contains(&WorkerState::Reading)
    }));

    let started = Instant::now();
    server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(1), "shutdown must not join readers");

    // The reading worker exits once its peer closes.
    drop(reader_peer);
    assert!(wait_for(Duration::from_secs(2), || server.active_workers() == 0));
}

#[test]
fn test_shutdown_while_peer_is_closing() {
    for round in 0..20 {
        let port = free_port();
        let mut server = TcpServerAgent::new(ConfigGate::ready(server_config(port, 1)).unwrap());
        server.tick();

        send_raw(port, b"Bye#closing");
        server.shutdown();

        assert!(
            wait_for(Duration::from_secs(2), || server.active_workers() == 0),
            "round {round}: worker still running: {:?}",
            server.worker_states()
        );
        // Every listener handle is gone once the workers exit.
        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok(), "round {round}");
    }
}
