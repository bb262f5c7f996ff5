//! TCP round-robin balancer, end to end.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use service_gateway::config::{BalancerConfig, ListenerConfig};
use service_gateway::lifecycle::Shutdown;
use service_gateway::load_balancer::TcpBalancer;
use service_gateway::net::Listener;

mod common;

/// A target that prefixes every echoed payload with its name.
async fn start_named_echo(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if socket.read_to_end(&mut buf).await.is_ok() {
                    let _ = socket.write_all(name.as_bytes()).await;
                    let _ = socket.write_all(b":").await;
                    let _ = socket.write_all(&buf).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

async fn start_balancer(targets: Vec<SocketAddr>) -> (SocketAddr, Shutdown) {
    let config = BalancerConfig {
        enabled: true,
        listener: ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 64,
        },
        targets: targets.iter().map(|t| t.to_string()).collect(),
        failure_cooldown_secs: 15,
        connect_timeout_secs: 1,
        drain_timeout_secs: 1,
    };
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let balancer = TcpBalancer::new(&config);
    tokio::spawn(balancer.run(listener, shutdown.subscribe()));
    (addr, shutdown)
}

async fn exchange(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The balancer may already have closed the connection.
    let _ = stream.write_all(payload).await;
    let _ = stream.shutdown().await;
    let mut out = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut out)).await;
    out
}

#[tokio::test]
async fn test_connections_rotate_across_targets() {
    let a = start_named_echo("a").await;
    let b = start_named_echo("b").await;
    let (addr, shutdown) = start_balancer(vec![a, b]).await;

    let mut seen = Vec::new();
    for i in 0..4 {
        let reply = exchange(addr, format!("msg{}", i).as_bytes()).await;
        seen.push(String::from_utf8(reply).unwrap());
    }
    assert_eq!(seen, vec!["a:msg0", "b:msg1", "a:msg2", "b:msg3"]);

    shutdown.trigger();
}

#[tokio::test]
async fn test_dead_target_is_skipped_after_failure() {
    let dead = common::closed_port().await;
    let live = start_named_echo("live").await;
    let (addr, shutdown) = start_balancer(vec![dead, live]).await;

    // The first connection lands on the dead target and is closed.
    let first = exchange(addr, b"hello").await;
    assert!(first.is_empty());

    for _ in 0..3 {
        let reply = exchange(addr, b"hello").await;
        assert_eq!(reply, b"live:hello");
    }

    shutdown.trigger();
}
