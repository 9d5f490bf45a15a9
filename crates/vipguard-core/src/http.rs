//! Minimal HTTP/1 client used for probes, config pulls, fan-out, and the
//! Docker Engine API.
//!
//! One connection per request over hyper's low-level client. Every request
//! is bounded by the caller's timeout, which covers connect, handshake,
//! and reading the full response body.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

const USER_AGENT: &str = concat!("vipguard/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure. Always transient from the caller's perspective.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("reading response body failed: {0}")]
    Body(#[source] hyper::Error),

    #[error("invalid request: {0}")]
    Build(#[from] http::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Where the bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `host:port` reached over TCP.
    Tcp(String),
    /// Path of a unix domain socket.
    Unix(PathBuf),
}

/// A parsed base URL: `http://host[:port][/prefix]`, `tcp://host:port`,
/// or `unix:///path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    target: Target,
    host: String,
    prefix: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(raw.to_string()));
            }
            return Ok(Self::unix(path));
        }

        let uri: Uri = raw
            .parse()
            .map_err(|_| TransportError::InvalidEndpoint(raw.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("tcp") => {}
            _ => return Err(TransportError::InvalidEndpoint(raw.to_string())),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| TransportError::InvalidEndpoint(raw.to_string()))?;
        let port = authority.port_u16().unwrap_or(80);
        let host = authority.host().to_string();
        let prefix = uri.path().trim_end_matches('/').to_string();

        Ok(Self {
            target: Target::Tcp(format!("{host}:{port}")),
            host: authority.as_str().to_string(),
            prefix,
        })
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Unix(path.into()),
            host: "localhost".to_string(),
            prefix: String::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Full request path for `path` below this endpoint's prefix.
    fn path_for(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Tcp(_) => write!(f, "http://{}{}", self.host, self.prefix),
            Target::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn get(endpoint: &Endpoint, path: &str, timeout: Duration) -> Result<Response, TransportError> {
    send(endpoint, Method::GET, path, timeout).await
}

/// POST with an empty body.
pub async fn post(endpoint: &Endpoint, path: &str, timeout: Duration) -> Result<Response, TransportError> {
    send(endpoint, Method::POST, path, timeout).await
}

pub async fn send(
    endpoint: &Endpoint,
    method: Method,
    path: &str,
    timeout: Duration,
) -> Result<Response, TransportError> {
    let path = endpoint.path_for(path);
    let mut builder = Request::builder()
        .method(method.clone())
        .uri(path.as_str())
        .header("host", endpoint.host.as_str())
        .header("user-agent", USER_AGENT);
    if method == Method::POST {
        builder = builder.header("content-length", "0");
    }
    let req = builder.body(Empty::<Bytes>::new())?;

    let request = async {
        match &endpoint.target {
            Target::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|source| TransportError::Connect {
                        target: addr.clone(),
                        source,
                    })?;
                exchange(stream, req).await
            }
            #[cfg(unix)]
            Target::Unix(socket) => {
                let stream = tokio::net::UnixStream::connect(socket)
                    .await
                    .map_err(|source| TransportError::Connect {
                        target: socket.display().to_string(),
                        source,
                    })?;
                exchange(stream, req).await
            }
            #[cfg(not(unix))]
            Target::Unix(socket) => Err(TransportError::InvalidEndpoint(
                socket.display().to_string(),
            )),
        }
    };

    match tokio::time::timeout(timeout, request).await {
        Ok(result) => {
            if let Err(e) = &result {
                debug!(error = %e, %endpoint, %method, %path, "http request failed");
            }
            result
        }
        Err(_) => {
            debug!(%endpoint, %method, %path, "http request timed out");
            Err(TransportError::Timeout(timeout))
        }
    }
}

async fn exchange<S>(stream: S, req: Request<Empty<Bytes>>) -> Result<Response, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(TransportError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let resp = sender.send_request(req).await.map_err(TransportError::Request)?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(TransportError::Body)?
        .to_bytes();

    Ok(Response { status, body })
}
