// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loopback integration tests: drive a real `Server` over 127.0.0.1 sockets.

use std::io::{BufRead, Read};
use std::net::TcpStream;
use std::sync::mpsc;
use std::time::Duration;

use pihub_server::{Callbacks, Server};

fn no_op_callbacks() -> Callbacks {
    Callbacks {
        on_client_connect: Box::new(|_, _| {}),
        on_data_received: Box::new(|_, _, _| {}),
        on_client_disconnect: Box::new(|_, _| {}),
        on_server_failure: Box::new(|_, _| {}),
    }
}

#[test]
fn accepts_up_to_max_clients_then_closes_the_rest() {
    let (tx, rx) = mpsc::channel();
    let callbacks = Callbacks {
        on_client_connect: Box::new(move |_, c| {
            let _ = tx.send(c.peer_ip().to_string());
        }),
        ..no_op_callbacks()
    };
    let server = Server::bind("127.0.0.1:0", 4, 2, callbacks).unwrap();
    let addr = server.local_addr().unwrap();
    server.run();

    let _a = TcpStream::connect(addr).unwrap();
    let _b = TcpStream::connect(addr).unwrap();
    let mut c = TcpStream::connect(addr).unwrap();

    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    let mut buf = [0u8; 1];
    let n = c.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "third connection should be closed by the server");

    server.shutdown();
}

#[test]
fn broadcast_reaches_every_registered_client() {
    let server = Server::bind("127.0.0.1:0", 4, 4, no_op_callbacks()).unwrap();
    let addr = server.local_addr().unwrap();
    server.run();

    let mut a = TcpStream::connect(addr).unwrap();
    let mut b = TcpStream::connect(addr).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    server.broadcast(b"hello\n").unwrap();

    let mut line = String::new();
    std::io::BufReader::new(&mut a).read_line(&mut line).unwrap();
    assert_eq!(line, "hello\n");
    line.clear();
    std::io::BufReader::new(&mut b).read_line(&mut line).unwrap();
    assert_eq!(line, "hello\n");

    server.shutdown();
}

#[test]
fn disconnect_closes_the_targeted_client_without_removing_others() {
    let server = Server::bind("127.0.0.1:0", 4, 4, no_op_callbacks()).unwrap();
    let addr = server.local_addr().unwrap();
    server.run();

    let mut a = TcpStream::connect(addr).unwrap();
    let _b = TcpStream::connect(addr).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.client_count(), 2);

    let target = server.clients().into_iter().next().unwrap();
    server.disconnect(&target);

    let mut buf = [0u8; 1];
    let n = a.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.client_count(), 1);

    server.shutdown();
}

#[test]
fn shutdown_drains_the_registry_and_stops_the_acceptor() {
    let server = Server::bind("127.0.0.1:0", 4, 4, no_op_callbacks()).unwrap();
    let addr = server.local_addr().unwrap();
    server.run();

    let _a = TcpStream::connect(addr).unwrap();
    let _b = TcpStream::connect(addr).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.client_count(), 2);

    server.shutdown();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(server.client_count(), 0);
    server.deinit();
}
