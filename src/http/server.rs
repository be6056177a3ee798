//! HTTP connection serving.
//!
//! # Responsibilities
//! - Accept connections from a bounded [`Listener`]
//! - Serve each connection on its own task with hyper-util's auto builder
//!   (HTTP/1.1 and HTTP/2)
//! - Close connections that sit idle past the configured timeout
//! - Drain: tell every connection to finish in-flight work and close
//!
//! # Design Decisions
//! - The router is wrapped by the [`Pipeline`] once, then cloned per request
//! - Drain is a watch channel every connection task selects on
//! - Open connections are counted by a [`ConnectionTracker`] so the lifecycle
//!   can wait for them

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tower::ServiceExt;

use crate::health::probe_router;
use crate::health::HealthProbe;
use crate::http::pipeline::Pipeline;
use crate::net::{ConnectionActivity, ConnectionPermit, ConnectionTracker, Listener};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Smallest interval between idle checks on a connection.
const MIN_IDLE_CHECK: Duration = Duration::from_millis(10);

/// Timeouts applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ServerTimeouts {
    /// Time allowed to receive a complete request head.
    pub read: Duration,
    /// Time a connection may go without a request in flight.
    pub idle: Duration,
}

/// HTTP server for the application router.
pub struct HttpServer {
    app: Router,
    builder: Arc<Builder<TokioExecutor>>,
    idle_timeout: Duration,
    connections: ConnectionTracker,
    drain: watch::Sender<bool>,
}

impl HttpServer {
    /// Build a server for `router`, mounting the readiness probe beside it and
    /// wrapping both in `pipeline`.
    ///
    /// # Panics
    ///
    /// Panics if `router` already routes `/healthz`; that path belongs to the
    /// readiness probe.
    pub fn new(router: Router, pipeline: &Pipeline, health: HealthProbe, timeouts: ServerTimeouts) -> Self {
        let app = pipeline.wrap(router.merge(probe_router(health)));

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.read);
        builder.http2().timer(TokioTimer::new());

        let (drain, _) = watch::channel(false);

        Self {
            app,
            builder: Arc::new(builder),
            idle_timeout: timeouts.idle,
            connections: ConnectionTracker::new(),
            drain,
        }
    }

    /// Accept and serve connections until the future is dropped.
    pub async fn accept_loop(&self, listener: &Listener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit),
                Err(err) => {
                    tracing::warn!(error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let app = self.app.clone();
        let builder = Arc::clone(&self.builder);
        let idle_timeout = self.idle_timeout;
        let guard = self.connections.track();
        let mut drain = self.drain.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();
            let activity = ConnectionActivity::new();

            let service = {
                let activity = Arc::clone(&activity);
                hyper::service::service_fn(move |mut request: Request<Incoming>| {
                    request.extensions_mut().insert(ConnectInfo(peer));
                    let in_flight = activity.begin();
                    let app = app.clone();
                    async move {
                        let response = app.oneshot(request).await;
                        drop(in_flight);
                        response
                    }
                })
            };

            let conn = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let mut closing = *drain.borrow_and_update();
            if closing {
                conn.as_mut().graceful_shutdown();
            }

            let mut idle_check = tokio::time::interval((idle_timeout / 2).max(MIN_IDLE_CHECK));

            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(err) = result {
                            tracing::debug!(%connection_id, %peer, error = %err, "Connection error");
                        }
                        break;
                    }
                    _ = drain.changed(), if !closing => {
                        closing = true;
                        conn.as_mut().graceful_shutdown();
                    }
                    _ = idle_check.tick(), if !closing => {
                        if activity.idle_for().is_some_and(|idle| idle >= idle_timeout) {
                            tracing::debug!(%connection_id, %peer, "Closing idle connection");
                            closing = true;
                            conn.as_mut().graceful_shutdown();
                        }
                    }
                }
            }

            drop(guard);
        });
    }

    /// Tell every connection, current and future, to shut down gracefully.
    pub fn begin_drain(&self) {
        self.drain.send_replace(true);
        tracing::info!(open_connections = self.open_connections(), "Draining connections");
    }

    /// Resolves once every connection has closed.
    pub async fn wait_drained(&self) {
        self.connections.wait_until_idle().await;
    }

    pub fn open_connections(&self) -> u64 {
        self.connections.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn server(idle: Duration) -> (HttpServer, Arc<HealthState>) {
        let state = Arc::new(HealthState::new());
        let server = HttpServer::new(
            Router::new().route("/ping", get(|| async { "pong" })),
            &Pipeline::default(),
            HealthProbe::new(Arc::clone(&state)),
            ServerTimeouts {
                read: Duration::from_secs(5),
                idle,
            },
        );
        (server, state)
    }

    async fn get_once(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_router_and_probe() {
        let listener = Listener::bind("127.0.0.1:0", 16).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (server, state) = server(Duration::from_secs(60));
        state.mark_ready();

        let server = Arc::new(server);
        let serving = Arc::clone(&server);
        let task = tokio::spawn(async move { serving.accept_loop(&listener).await });

        assert!(get_once(addr, "/ping").await.ends_with("pong"));
        assert!(get_once(addr, "/healthz").await.starts_with("HTTP/1.1 204"));

        task.abort();
    }

    #[test]
    #[should_panic]
    fn healthz_route_is_reserved() {
        let _ = HttpServer::new(
            Router::new().route("/healthz", get(|| async { "mine" })),
            &Pipeline::default(),
            HealthProbe::new(Arc::new(HealthState::new())),
            ServerTimeouts {
                read: Duration::from_secs(5),
                idle: Duration::from_secs(60),
            },
        );
    }

    #[tokio::test]
    async fn idle_connections_are_closed() {
        let listener = Listener::bind("127.0.0.1:0", 16).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (server, _) = server(Duration::from_millis(100));

        let server = Arc::new(server);
        let serving = Arc::clone(&server);
        let task = tokio::spawn(async move { serving.accept_loop(&listener).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("idle connection was not closed");
        assert_eq!(read.unwrap(), 0);

        tokio::time::timeout(Duration::from_secs(5), server.wait_drained())
            .await
            .unwrap();
        task.abort();
    }

    #[tokio::test]
    async fn drain_closes_keep_alive_connections() {
        let listener = Listener::bind("127.0.0.1:0", 16).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (server, _) = server(Duration::from_secs(60));

        let server = Arc::new(server);
        let serving = Arc::clone(&server);
        let task = tokio::spawn(async move { serving.accept_loop(&listener).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 512];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert_eq!(server.open_connections(), 1);

        task.abort();
        server.begin_drain();
        tokio::time::timeout(Duration::from_secs(5), server.wait_drained())
            .await
            .unwrap();
        assert_eq!(server.open_connections(), 0);
    }
}
