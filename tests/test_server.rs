mod common;

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cinder::config::Config;
use cinder::server::listener::{ControlFlags, Server};
use common::temp_root;

fn start(name: &str, max_connections: usize) -> (SocketAddr, ControlFlags, JoinHandle<anyhow::Result<()>>) {
    let root = temp_root(name);
    fs::write(root.join("hello.txt"), "hello\n").unwrap();
    let cfg = Config {
        listen_addr: "127.0.0.1:0".to_string(),
        document_root: root,
        max_connections,
        ..Config::default()
    };

    let flags = ControlFlags::default();
    let server_flags = flags.clone();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || -> anyhow::Result<()> {
        let mut server = Server::bind(cfg)?;
        tx.send(server.local_addr()?)?;
        server.run(&server_flags)
    });
    (rx.recv().unwrap(), flags, handle)
}

/// Reads until `suffix` has arrived.
fn read_until(stream: &mut TcpStream, suffix: &str) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while !out.ends_with(suffix.as_bytes()) {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed early: {}", String::from_utf8_lossy(&out));
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(out).unwrap()
}

#[test]
fn test_server_serves_over_tcp() {
    let (addr, flags, handle) = start("server-tcp", 8);

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"GET /hello.txt HTTP/1.0\r\n\r\n").unwrap();
    let mut response = String::new();
    client.read_to_string(&mut response).unwrap();

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.contains("Content-Length: 6\r\n"));
    assert!(response.ends_with("\r\n\r\nhello\n"));

    flags.lame_duck.store(true, Ordering::Relaxed);
    handle.join().unwrap().unwrap();
}

#[test]
fn test_keep_alive_and_pool_exhaustion() {
    let (addr, flags, handle) = start("server-pool", 1);

    let mut first = TcpStream::connect(addr).unwrap();
    first
        .write_all(b"GET /hello.txt HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n")
        .unwrap();
    let response = read_until(&mut first, "hello\n");
    assert!(response.contains("Keep-Alive: timeout=10, max=1000\r\n"));

    // the only record is held by the kept-alive connection
    let mut second = TcpStream::connect(addr).unwrap();
    let mut rejected = Vec::new();
    let _ = second.read_to_end(&mut rejected);
    assert!(rejected.is_empty());

    first.write_all(b"GET /missing HTTP/1.0\r\n\r\n").unwrap();
    let mut response = String::new();
    first.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.0 404 Not Found\r\n"));

    flags.exit.store(true, Ordering::Relaxed);
    handle.join().unwrap().unwrap();
}
