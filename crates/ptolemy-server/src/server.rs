//! HTTP server.
//!
//! One tokio task per connection, served by hyper's HTTP/1 connection
//! driver. Each request body is read under a size limit and a deadline
//! before it reaches the [`Dispatcher`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use ptolemy_core::{ApiError, Caller, RequestContext};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// A bound dispatcher.
///
/// ```rust,ignore
/// let server = Server::new(config, dispatcher);
/// server.run().await?;
/// ```
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Serves `dispatcher` with `config`.
    #[must_use]
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// The settings.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> ServerResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("invalid address '{}': {e}", self.config.http_addr()))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("cannot bind {addr}: {e}")))?;
        self.run_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` fires, then
    /// drains connections for at most the shutdown timeout.
    pub async fn run_on(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local = listener.local_addr()?;
        info!(addr = %local, routes = self.dispatcher.routes().len(), "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.serve_connection(stream, remote, shutdown).await {
                                debug!(remote = %remote, error = %e, "connection closed with error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(
            active = tracker.active_connections(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.drained()).await.is_err() {
            warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }
        info!("server stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(req, remote).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle(&self, req: Request<Incoming>, remote: SocketAddr) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let caller = Caller::from_parts(&parts.headers, Some(remote));

        let (body, failure) = match read_body(body, &self.config).await {
            Ok(body) => (body, None),
            Err(err) => (Bytes::new(), Some(err)),
        };

        let ctx = RequestContext::new(parts.method, parts.uri, parts.headers, body)
            .with_caller(caller);
        let response = match failure {
            Some(err) => self.dispatcher.reject(ctx, err).await,
            None => self.dispatcher.dispatch(ctx).await,
        };
        response.map(Full::new)
    }
}

/// Reads a whole request body under the size limit and the body deadline.
///
/// An oversize body is `INVALID_PARAMETER`. A body that stalls or breaks
/// off before its end is `REQUEST_TIMEOUT`.
async fn read_body<B>(body: B, config: &ServerConfig) -> Result<Bytes, ApiError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limited = Limited::new(body, config.max_body_bytes());
    match tokio::time::timeout(config.body_timeout(), limited.collect()).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(e)) if e.is::<LengthLimitError>() => Err(ApiError::invalid_parameter(format!(
            "request body exceeds {} bytes",
            config.max_body_bytes()
        ))),
        Ok(Err(e)) => Err(ApiError::request_timeout(format!(
            "failed to read request body: {e}"
        ))),
        Err(_) => Err(ApiError::request_timeout(format!(
            "request body not received within {} ms",
            config.body_timeout().as_millis()
        ))),
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::io;

    use http_body_util::{Empty, StreamBody};
    use hyper::body::Frame;
    use hyper::client::conn::http1 as client;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use ptolemy_compiler::Compiler;
    use ptolemy_core::ModelRegistry;

    use crate::builtin::{ping_handlers, ping_specification, PingInfo};

    fn ping_server(config: ServerConfig) -> Server {
        let info = Arc::new(PingInfo::new("test", "0.1.0"));
        let mut registry = ModelRegistry::new();
        let api = Compiler::new()
            .compile(&ping_specification().unwrap(), &mut registry, &ping_handlers(info))
            .unwrap();
        let dispatcher = Dispatcher::builder(registry.freeze()).api(api).build().unwrap();
        Server::new(config, dispatcher)
    }

    async fn get(addr: SocketAddr, path: &str) -> (http::StatusCode, Bytes) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = client::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);
        let req = Request::get(path)
            .header(http::header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn post(
        addr: SocketAddr,
        path: &str,
        body: Bytes,
    ) -> (http::StatusCode, serde_json::Value) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = client::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);
        let req = Request::post(path)
            .header(http::header::HOST, "localhost")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .unwrap();
        let response = sender.send_request(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Sends raw bytes and reads until the response carries `needle`.
    async fn raw_exchange(addr: SocketAddr, request: &[u8], needle: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0_u8; 1024];
        tokio::time::timeout(Duration::from_secs(3), async {
            while !String::from_utf8_lossy(&received).contains(needle) {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .expect("response within 3s");
        String::from_utf8_lossy(&received).into_owned()
    }

    async fn start(config: ServerConfig) -> (SocketAddr, ShutdownSignal) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        tokio::spawn(ping_server(config).run_on(listener, shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn test_oversize_body_is_rejected() {
        let config = ServerConfig::builder().max_body_bytes(16).build();
        let (addr, shutdown) = start(config).await;

        let (status, envelope) = post(addr, "/ping", Bytes::from(vec![b' '; 64])).await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(envelope["error"], "INVALID_PARAMETER");
        assert_eq!(envelope["error_description"], "request body exceeds 16 bytes");
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let config = ServerConfig::builder()
            .body_timeout(Duration::from_millis(50))
            .build();
        let (addr, shutdown) = start(config).await;

        let response = raw_exchange(
            addr,
            b"POST /ping HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\n{\"partial\"",
            "REQUEST_TIMEOUT",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 408"), "{response}");
        assert!(response.contains("REQUEST_TIMEOUT"), "{response}");
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_broken_body_is_request_timeout() {
        let chunks: Vec<Result<Frame<Bytes>, io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"{\"half\""))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks));
        let err = read_body(body, &ServerConfig::builder().build()).await.unwrap_err();
        assert_eq!(err.code(), "REQUEST_TIMEOUT");
        assert_eq!(err.status_code(), http::StatusCode::REQUEST_TIMEOUT);
        assert!(err.description().contains("peer went away"));
    }

    #[tokio::test]
    async fn test_read_body_limits() {
        let config = ServerConfig::builder()
            .max_body_bytes(4)
            .body_timeout(Duration::from_millis(20))
            .build();

        let fits = read_body(Full::new(Bytes::from_static(b"{}")), &config).await.unwrap();
        assert_eq!(&fits[..], b"{}");

        let oversize = read_body(Full::new(Bytes::from_static(b"[1,2,3]")), &config)
            .await
            .unwrap_err();
        assert_eq!(oversize.code(), "INVALID_PARAMETER");

        let never =
            StreamBody::new(futures_util::stream::pending::<Result<Frame<Bytes>, io::Error>>());
        let stalled = read_body(never, &config).await.unwrap_err();
        assert_eq!(stalled.code(), "REQUEST_TIMEOUT");
    }

    #[tokio::test]
    async fn test_serves_ping_and_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let config = ServerConfig::builder()
            .shutdown_timeout(Duration::from_secs(1))
            .build();
        let server = tokio::spawn(ping_server(config).run_on(listener, shutdown.clone()));

        let (status, body) = get(addr, "/ping").await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(&body[..], b"{}");

        let (status, _) = get(addr, "/missing").await;
        assert_eq!(status, http::StatusCode::NOT_FOUND);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("server should stop")
            .expect("task should not panic")
            .expect("clean shutdown");
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let config = ServerConfig::builder().http_addr(addr.to_string()).build();
        let result = ping_server(config)
            .run_with_shutdown(ShutdownSignal::new())
            .await;
        assert!(matches!(result, Err(ServerError::Bind(_))));
    }
}
