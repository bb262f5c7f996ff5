//! TCP pass-through balancer.
//!
//! # Responsibilities
//! - Accept client connections on the balancer port
//! - Pick a target per connection and connect with a deadline
//! - Splice bytes both ways until both directions finish
//! - Drain in-flight connections on shutdown
//!
//! # Design Decisions
//! - Target-side errors mark the target failed; client-side errors do not
//! - No retry on another target once a client connection is assigned
//! - EOF on one side becomes a write shutdown on the other (half-close)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::BalancerConfig;
use crate::load_balancer::{round_robin::RoundRobin, target::BalancerTarget, LoadBalancer};
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics;

const BUFFER_SIZE: usize = 16 * 1024;

/// Which end of a spliced connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Target,
}

#[derive(Debug, Error)]
#[error("{side:?} side failed: {source}")]
pub struct SpliceError {
    pub side: Side,
    #[source]
    pub source: std::io::Error,
}

impl SpliceError {
    fn new(side: Side, source: std::io::Error) -> Self {
        Self { side, source }
    }
}

/// Round-robin TCP balancer.
pub struct TcpBalancer {
    selector: Arc<dyn LoadBalancer>,
    connect_timeout: Duration,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl TcpBalancer {
    /// Build a round-robin balancer over the configured targets.
    /// Malformed targets are skipped with a warning.
    pub fn new(config: &BalancerConfig) -> Self {
        let targets: Vec<BalancerTarget> = config
            .targets
            .iter()
            .filter_map(|t| {
                let parsed = BalancerTarget::parse(t);
                if parsed.is_none() {
                    tracing::warn!(target = %t, "Ignoring malformed balancer target");
                }
                parsed
            })
            .collect();
        let selector = RoundRobin::new(targets, Duration::from_secs(config.failure_cooldown_secs));
        Self::with_selector(config, Arc::new(selector))
    }

    pub fn with_selector(config: &BalancerConfig, selector: Arc<dyn LoadBalancer>) -> Self {
        Self {
            selector,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept until shutdown, then drain in-flight connections.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "TCP balancer starting");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("TCP balancer stopping accept loop");
                    break;
                }
                accepted = listener.accept() => {
                    let (client, peer, permit) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Balancer accept failed");
                            time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    metrics::record_balancer_active(self.tracker.active_count());
                    let selector = Arc::clone(&self.selector);
                    let connect_timeout = self.connect_timeout;
                    let tracker = self.tracker.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        tracing::debug!(connection_id = %guard.id(), peer = %peer, "Balancing connection");
                        handle_connection(selector.as_ref(), client, connect_timeout).await;
                        drop(guard);
                        metrics::record_balancer_active(tracker.active_count());
                    });
                }
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, "Draining balancer connections");
        }
        if !self.tracker.drain(self.drain_timeout).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, dropping remaining connections"
            );
        }
        tracing::info!("TCP balancer stopped");
    }
}

/// Serve one client connection end to end.
pub async fn handle_connection(selector: &dyn LoadBalancer, mut client: TcpStream, connect_timeout: Duration) {
    let Some(target) = selector.next_target() else {
        tracing::warn!("No balancer targets configured, closing client");
        return;
    };
    let addr = target.addr();

    let mut upstream = match time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(target = %addr, error = %e, "Balancer target connect failed");
            selector.mark_failed(&addr);
            return;
        }
        Err(_) => {
            tracing::warn!(target = %addr, "Balancer target connect timed out");
            selector.mark_failed(&addr);
            return;
        }
    };
    metrics::record_balancer_connection(&addr);

    match splice(&mut client, &mut upstream).await {
        Ok((sent, received)) => {
            tracing::debug!(target = %addr, sent, received, "Balanced connection finished");
        }
        Err(e) if e.side == Side::Target => {
            tracing::warn!(target = %addr, error = %e.source, "Balancer target connection failed");
            selector.mark_failed(&addr);
        }
        Err(e) => {
            tracing::debug!(target = %addr, error = %e.source, "Client connection failed");
        }
    }
}

/// Copy bytes both ways until both directions reach EOF or one side errors.
/// Returns (client → target, target → client) byte counts.
pub async fn splice(client: &mut TcpStream, target: &mut TcpStream) -> Result<(u64, u64), SpliceError> {
    let (mut client_read, mut client_write) = client.split();
    let (mut target_read, mut target_write) = target.split();

    tokio::try_join!(
        pump(&mut client_read, &mut target_write, Side::Client, Side::Target),
        pump(&mut target_read, &mut client_write, Side::Target, Side::Client),
    )
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, from: Side, to: Side) -> Result<u64, SpliceError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| SpliceError::new(from, e))?;
        if n == 0 {
            writer.shutdown().await.map_err(|e| SpliceError::new(to, e))?;
            return Ok(total);
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| SpliceError::new(to, e))?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn splice_relays_both_directions_and_half_close() {
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = echo.accept().await.unwrap();
            let mut buf = Vec::new();
            s.read_to_end(&mut buf).await.unwrap();
            s.write_all(&buf).await.unwrap();
        });

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut client, _) = front.accept().await.unwrap();
            let mut upstream = TcpStream::connect(echo_addr).await.unwrap();
            splice(&mut client, &mut upstream).await.unwrap();
        });

        let mut c = TcpStream::connect(front_addr).await.unwrap();
        c.write_all(b"ping").await.unwrap();
        c.shutdown().await.unwrap();
        let mut out = Vec::new();
        c.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ping");
    }

    #[tokio::test]
    async fn refused_target_is_marked_failed() {
        // Grab a free port, then close it so connects are refused.
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = closed.local_addr().unwrap();
        drop(closed);

        let selector = RoundRobin::new(
            vec![BalancerTarget::new("127.0.0.1", dead_addr.port())],
            Duration::from_secs(15),
        );

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        let _c = TcpStream::connect(front_addr).await.unwrap();
        let (client, _) = front.accept().await.unwrap();

        handle_connection(&selector, client, Duration::from_secs(1)).await;
        assert_eq!(selector.cooling_down(), vec![dead_addr.to_string()]);
    }
}
