//! The webhook listener: an owned service that binds a TCP socket and serves it with hyper on a
//! single background task.
//!
//! Connections are served one at a time on that task, which therefore is the only producer of
//! client updates. `GET` returns a fixed diagnostic text, `POST` bodies go through
//! [`parse_body`](crate::body::parse_body) and on to the [`Dispatcher`].

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::body::parse_body;
use crate::dispatcher::Dispatcher;
use crate::state_machine::system::SystemResource;
use crate::status::StatusBoard;

pub mod config;
pub mod error;

pub use config::{ListenerConfig, Params};
pub use error::ListenerError;

/// Body returned for any `GET`.
pub const DIAGNOSTIC_TEXT: &str = "This service is only to receive Plex WebHooks";

/// Public address used to discover the outbound interface. No packet is sent to it.
const PROBE_ADDR: &str = "8.8.8.8:80";

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Running {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

/// Webhook listener with explicit [`start`](Self::start) and [`stop`](Self::stop).
#[derive(Debug)]
pub struct Listener {
    config: ListenerConfig,
    dispatcher: Arc<Dispatcher>,
    status: StatusBoard,
    running: Option<Running>,
}

impl Listener {
    pub fn new(config: ListenerConfig, dispatcher: Arc<Dispatcher>, status: StatusBoard) -> Self {
        Self {
            config,
            dispatcher,
            status,
            running: None,
        }
    }

    /// Replace the configuration. Takes effect on the next [`start`](Self::start).
    pub fn set_config(&mut self, config: ListenerConfig) {
        self.config = config;
    }

    /// Bind and spawn the serving task.
    ///
    /// A no-op returning the current address when already running. A listener whose task has
    /// died is torn down and bound again.
    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return Ok(running.local_addr);
            }
            self.stop().await;
        }

        let ip = match self.config.bind_address {
            Some(ip) => ip,
            None => discover_local_ip().await?,
        };
        let addr = SocketAddr::new(ip, self.config.port);

        let socket = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;

        let server = WebhookServer {
            service: WebhookService {
                dispatcher: Arc::clone(&self.dispatcher),
                max_body_bytes: self.config.max_body_bytes,
            },
            read_timeout: self.config.read_timeout,
        };
        let task = tokio::spawn(server.run(socket));

        info!(address = %local_addr, "Webhook listener started");
        info!("Set your Plex Media Server webhook URL to: http://{local_addr}/");

        self.status.set_listener(true, local_addr.port());
        self.running = Some(Running { local_addr, task });

        Ok(local_addr)
    }

    /// Stop serving and release the port. A no-op when not started.
    ///
    /// Returns once the serving task is gone, so the port can be bound again immediately.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.task.abort();
        if let Err(e) = running.task.await
            && e.is_panic()
        {
            error!(error = %e, "Webhook listener task panicked");
        }

        self.status.set_listener(false, 0);
        info!(address = %running.local_addr, "Webhook listener stopped");
    }

    /// Whether [`start`](Self::start) succeeded and [`stop`](Self::stop) has not been called
    /// since, regardless of whether the task is still alive.
    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Whether the serving task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Kill the serving task without going through [`stop`](Self::stop).
    #[cfg(test)]
    pub(crate) async fn kill(&mut self) {
        if let Some(running) = &self.running {
            running.task.abort();
            while !running.task.is_finished() {
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Find the address of the interface used for outbound traffic.
///
/// Connecting a UDP socket only selects a route, nothing is sent.
async fn discover_local_ip() -> Result<IpAddr, ListenerError> {
    let probe = async {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(PROBE_ADDR).await?;
        socket.local_addr()
    };

    match probe.await {
        Ok(addr) if !addr.ip().is_unspecified() => Ok(addr.ip()),
        Ok(_) => Err(ListenerError::NoLocalAddress(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no route to probe address",
        ))),
        Err(e) => Err(ListenerError::NoLocalAddress(e)),
    }
}

struct WebhookServer {
    service: WebhookService,
    read_timeout: Duration,
}

impl WebhookServer {
    async fn run(self, socket: TcpListener) {
        loop {
            match socket.accept().await {
                Ok((stream, peer)) => self.serve(stream, peer).await,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Serve a single request on `stream`, then close it.
    async fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let service = self.service.clone();
        let connection = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(
                TokioIo::new(stream),
                service_fn(move |request| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(service.respond(request, peer).await) }
                }),
            );

        match tokio::time::timeout(self.read_timeout, connection).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %peer, error = %e, "Failed to serve connection"),
            Err(_) => debug!(peer = %peer, "Timed out serving connection"),
        }
    }
}

#[derive(Clone)]
struct WebhookService {
    dispatcher: Arc<Dispatcher>,
    max_body_bytes: usize,
}

impl WebhookService {
    async fn respond(&self, request: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
        match request.method() {
            &Method::GET => {
                info!(peer = %peer, path = %request.uri().path(), "HTTP GET received");
                reply(StatusCode::OK, DIAGNOSTIC_TEXT)
            }
            &Method::POST => {
                let body = match read_body(request.into_body(), self.max_body_bytes).await {
                    Ok(body) => body,
                    Err(status) => {
                        debug!(peer = %peer, status = %status, "Failed to read request body");
                        return reply(status, "");
                    }
                };

                let received_at = Instant::generate();
                match parse_body(&body) {
                    Ok(record) => {
                        self.dispatcher.handle(received_at, &record);
                    }
                    Err(reason) => {
                        warn!(peer = %peer, reason = %reason, "Non-Plex POST received and ignored");
                    }
                }
                reply(StatusCode::OK, "")
            }
            method => {
                debug!(peer = %peer, method = %method, "Unsupported method");
                reply(StatusCode::METHOD_NOT_ALLOWED, "")
            }
        }
    }
}

/// Collect a request body of at most `limit` bytes, whatever its transfer framing.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, StatusCode>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
        Err(_) => Err(StatusCode::BAD_REQUEST),
    }
}

fn reply(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::client::ClientId;

    const EVENT_JSON: &str =
        r#"{"event":"media.pause","Player":{"title":"Living Room","uuid":"ABCD-1234-EF56-7890"}}"#;

    fn local_config() -> ListenerConfig {
        ListenerConfig::builder()
            .bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .port(0)
            .rapid_trigger_secs(5)
            .read_timeout(Duration::from_secs(2))
            .build()
    }

    fn listener() -> (Listener, Arc<Dispatcher>, StatusBoard) {
        let status = StatusBoard::new();
        let dispatcher = Arc::new(Dispatcher::new(5, status.clone()));
        let listener = Listener::new(local_config(), Arc::clone(&dispatcher), status.clone());
        (listener, dispatcher, status)
    }

    async fn send(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn post(body: &str) -> Vec<u8> {
        format!(
            "POST /plex HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    fn plex_body() -> String {
        format!(
            "--boundary\r\nContent-Disposition: form-data; name=\"payload\"\r\nContent-Type: application/json\r\n\r\n{EVENT_JSON}\r\n--boundary--\r\n"
        )
    }

    #[tokio::test]
    async fn test_get_returns_diagnostic_text() {
        let (mut listener, _, status) = listener();
        let addr = listener.start().await.unwrap();
        assert!(status.current().online);
        assert_eq!(status.current().port, addr.port());

        let response = send(addr, b"GET / HTTP/1.1\r\nHost: test\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(DIAGNOSTIC_TEXT));

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_post_dispatches_event() {
        let (mut listener, dispatcher, status) = listener();
        let addr = listener.start().await.unwrap();

        let response = send(addr, &post(&plex_body())).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        let id = ClientId::normalize("ABCD-1234-EF56-7890").unwrap();
        let snapshot = dispatcher.snapshot(&id).unwrap();
        assert_eq!(snapshot.display_name, "Living Room");
        assert_eq!(snapshot.last_event.as_deref(), Some("media.pause"));
        assert!(snapshot.armed_at().is_some());
        assert_eq!(status.current().client_count, 1);

        // Second press inside the window.
        send(addr, &post(&plex_body())).await;
        assert!(dispatcher.snapshot(&id).unwrap().is_triggered());

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_chunked_post_dispatches_event() {
        let (mut listener, dispatcher, _) = listener();
        let addr = listener.start().await.unwrap();

        let body = plex_body();
        let (first, rest) = body.split_at(body.len() / 2);
        let request = format!(
            "POST / HTTP/1.1\r\nHost: test\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{first}\r\n{:x}\r\n{rest}\r\n0\r\n\r\n",
            first.len(),
            rest.len()
        );

        let response = send(addr, request.as_bytes()).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        let id = ClientId::normalize("ABCD-1234-EF56-7890").unwrap();
        let snapshot = dispatcher.snapshot(&id).unwrap();
        assert_eq!(snapshot.last_event.as_deref(), Some("media.pause"));

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(
            read_body(body.clone(), 16).await,
            Ok(Bytes::from_static(b"0123456789"))
        );
        assert_eq!(
            read_body(body, 4).await,
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        );
    }

    #[tokio::test]
    async fn test_non_plex_post_ignored() {
        let (mut listener, dispatcher, _) = listener();
        let addr = listener.start().await.unwrap();

        let response = send(addr, &post("name=value&event=nothing")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(dispatcher.client_count(), 0);

        let response = send(addr, b"DELETE / HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405"));

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (mut listener, _, status) = listener();

        let first = listener.start().await.unwrap();
        let second = listener.start().await.unwrap();
        assert_eq!(first, second);
        assert!(listener.is_running());

        listener.stop().await;
        listener.stop().await;
        assert!(!listener.is_started());
        assert!(!status.current().online);
        assert_eq!(status.current().port, 0);

        // The port is released.
        assert!(TcpStream::connect(first).await.is_err());
    }

    #[tokio::test]
    async fn test_restart_rebinds_same_port() {
        let (mut listener, _, _) = listener();
        let addr = listener.start().await.unwrap();
        listener.stop().await;

        let mut config = local_config();
        config.port = addr.port();
        listener.set_config(config);

        let rebound = listener.start().await.unwrap();
        assert_eq!(rebound, addr);
        listener.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() {
        let (mut first, _, _) = listener();
        let addr = first.start().await.unwrap();

        let (mut second, _, status) = listener();
        let mut config = local_config();
        config.port = addr.port();
        second.set_config(config);

        let result = second.start().await;
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
        assert!(!second.is_started());
        assert!(!status.current().online);

        first.stop().await;
    }

    #[tokio::test]
    async fn test_dead_task_detected() {
        let (mut listener, _, _) = listener();
        listener.start().await.unwrap();

        listener.kill().await;
        assert!(listener.is_started());
        assert!(!listener.is_running());

        let addr = listener.start().await.unwrap();
        assert!(listener.is_running());
        let response = send(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        listener.stop().await;
    }
}
