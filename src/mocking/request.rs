//! Outbound request records

use crate::response::headers::RawHeaders;
use crate::utils::errors::{EngineError, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

/// Scheme, host and port of a request target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(scheme: &str, host: &str, port: Option<u16>) -> Result<Self> {
        let scheme = scheme.to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            other => {
                return Err(EngineError::InvalidOrigin(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        if host.is_empty() {
            return Err(EngineError::InvalidOrigin("missing host".to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port: port.unwrap_or(default_port),
        })
    }

    /// Parse `scheme://host[:port]`. A bare `/` path is tolerated, anything
    /// longer is rejected.
    pub fn parse(origin: &str) -> Result<Self> {
        let url = Url::parse(origin)
            .map_err(|e| EngineError::InvalidOrigin(format!("{}: {}", origin, e)))?;
        if url.path() != "/" || url.query().is_some() {
            return Err(EngineError::InvalidOrigin(format!(
                "{}: origin must not carry a path or query",
                origin
            )));
        }
        Self::from_url(&url)
    }

    fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| EngineError::InvalidOrigin(format!("{}: missing host", url)))?;
        Self::new(url.scheme(), host, url.port())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Origin {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Request body as seen by the engine
pub enum RequestBody {
    Empty,
    Buffered(Bytes),

    /// Still arriving; `received` holds what has been read so far
    Streaming {
        received: BytesMut,
        rest: BoxStream<'static, Result<Bytes>>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            RequestBody::Streaming { received, .. } => {
                write!(f, "Streaming({} bytes so far)", received.len())
            }
        }
    }
}

/// A single outbound request handed over by the interception substrate
#[derive(Debug)]
pub struct RequestRecord {
    method: Method,
    origin: Origin,
    path: String,
    query: Option<String>,
    headers: RawHeaders,
    body: RequestBody,
}

impl RequestRecord {
    /// Build a request for an absolute `http(s)://` URL
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| EngineError::InvalidOrigin(format!("{}: {}", url, e)))?;
        let origin = Origin::from_url(&parsed)?;

        Ok(Self {
            method,
            origin,
            path: parsed.path().to_string(),
            query: parsed.query().map(str::to_string),
            headers: RawHeaders::new(),
            body: RequestBody::Empty,
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Buffered(body)
        };
        self
    }

    pub fn with_body_stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        self.body = RequestBody::Streaming {
            received: BytesMut::new(),
            rest: stream.boxed(),
        };
        self
    }

    /// Convert a hyper request. Origin-form URIs fall back to the `Host`
    /// header and plain http.
    pub fn from_hyper<B>(req: hyper::Request<B>) -> Result<Self>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let origin = match (parts.uri.scheme_str(), parts.uri.host()) {
            (Some(scheme), Some(host)) => Origin::new(scheme, host, parts.uri.port_u16())?,
            _ => {
                let authority = parts
                    .headers
                    .get(hyper::header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .ok_or_else(|| EngineError::InvalidOrigin("request has no host".to_string()))?;
                let (host, port) = match authority.rsplit_once(':') {
                    Some((host, port)) => (host, port.parse().ok()),
                    None => (authority, None),
                };
                Origin::new("http", host, port)?
            }
        };

        let mut headers = RawHeaders::new();
        for (name, value) in parts.headers.iter() {
            headers.push(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        let rest = TryStreamExt::map_err(body.into_data_stream(), |e| {
            EngineError::BodySource(e.to_string())
        })
        .boxed();

        Ok(Self {
            method: parts.method,
            origin,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers,
            body: RequestBody::Streaming {
                received: BytesMut::new(),
                rest,
            },
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn hostname(&self) -> &str {
        self.origin.host()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &RawHeaders {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// The body, if it is fully available
    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            RequestBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// `path?query` as it appeared on the request line
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.path_and_query())
    }

    /// Read the remaining body into memory.
    ///
    /// Cancel-safe: chunks already read stay in the record if the future is
    /// dropped, and a later call resumes where this one stopped.
    pub(crate) async fn buffer_body(&mut self) -> Result<Option<&Bytes>> {
        if let RequestBody::Streaming { received, rest } = &mut self.body {
            while let Some(chunk) = rest.next().await {
                received.extend_from_slice(&chunk?);
            }
            let bytes = std::mem::take(received).freeze();
            debug!("Buffered {} request body bytes", bytes.len());
            self.body = if bytes.is_empty() {
                RequestBody::Empty
            } else {
                RequestBody::Buffered(bytes)
            };
        }

        Ok(self.buffered_body())
    }

    /// Convert into a hyper request for the real network path
    pub fn into_hyper(self) -> Result<hyper::Request<UnsyncBoxBody<Bytes, EngineError>>> {
        let url = self.url();
        let body = match self.body {
            RequestBody::Empty => Empty::<Bytes>::new()
                .map_err(|never| match never {})
                .boxed_unsync(),
            RequestBody::Buffered(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            RequestBody::Streaming { received, rest } => {
                let head = stream::once(async move { Ok(received.freeze()) });
                StreamBody::new(head.chain(rest).map_ok(Frame::data)).boxed_unsync()
            }
        };

        let mut req = hyper::Request::builder()
            .method(self.method)
            .uri(&url)
            .body(body)
            .map_err(|e| EngineError::Network(format!("cannot build request for {}: {}", url, e)))?;

        for (name, value) in self.headers.iter() {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    req.headers_mut().append(name, value);
                }
                _ => warn!("Dropping unforwardable header {}", name),
            }
        }

        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_origin_parse() {
        let origin = Origin::parse("http://Example.test").unwrap();
        assert_eq!(origin.host(), "example.test");
        assert_eq!(origin.port(), 80);
        assert_eq!(origin.to_string(), "http://example.test:80");

        let tls: Origin = "https://example.test:8443".parse().unwrap();
        assert_eq!(tls.port(), 8443);
        assert_eq!(tls.host_port(), "example.test:8443");

        assert_eq!(Origin::parse("https://example.test").unwrap().port(), 443);
    }

    #[test]
    fn test_origin_rejects_bad_input() {
        assert!(Origin::parse("ftp://example.test").is_err());
        assert!(Origin::parse("not a url").is_err());
        assert!(Origin::parse("http://example.test/base").is_err());
    }

    #[test]
    fn test_request_url_parts() {
        let req = RequestRecord::get("http://example.test/please?x=1")
            .unwrap()
            .with_header("Accept", "text/plain");

        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.hostname(), "example.test");
        assert_eq!(req.path(), "/please");
        assert_eq!(req.query(), Some("x=1"));
        assert_eq!(req.headers().get("accept"), Some("text/plain"));
        assert_eq!(req.url(), "http://example.test:80/please?x=1");
    }

    #[tokio::test]
    async fn test_buffer_streaming_body() {
        let chunks = vec![Ok(Bytes::from("exa")), Ok(Bytes::from("mple=123"))];
        let mut req = RequestRecord::post("http://example.test/please")
            .unwrap()
            .with_body_stream(stream::iter(chunks));

        assert!(req.buffered_body().is_none());
        let body = req.buffer_body().await.unwrap().cloned();
        assert_eq!(body, Some(Bytes::from("example=123")));
        assert_eq!(req.buffered_body(), Some(&Bytes::from("example=123")));
    }

    #[tokio::test]
    async fn test_buffer_resumes_after_timeout() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes>>(4);
        let mut req = RequestRecord::post("http://example.test/")
            .unwrap()
            .with_body_stream(tokio_stream::wrappers::ReceiverStream::new(rx));

        tx.send(Ok(Bytes::from("part1;"))).await.unwrap();
        let first = tokio::time::timeout(Duration::from_millis(20), req.buffer_body()).await;
        assert!(first.is_err());

        tx.send(Ok(Bytes::from("part2"))).await.unwrap();
        drop(tx);
        let body = req.buffer_body().await.unwrap().cloned();
        assert_eq!(body, Some(Bytes::from("part1;part2")));
    }

    #[tokio::test]
    async fn test_from_hyper_uses_host_header() {
        let req = hyper::Request::builder()
            .method("POST")
            .uri("/submit?a=b")
            .header("Host", "example.test:8080")
            .body(Full::new(Bytes::from("payload")))
            .unwrap();

        let mut record = RequestRecord::from_hyper(req).unwrap();
        assert_eq!(record.origin().port(), 8080);
        assert_eq!(record.path(), "/submit");
        assert_eq!(record.query(), Some("a=b"));

        let body = record.buffer_body().await.unwrap().cloned();
        assert_eq!(body, Some(Bytes::from("payload")));
    }

    #[tokio::test]
    async fn test_into_hyper_keeps_body() {
        let req = RequestRecord::post("http://example.test/x")
            .unwrap()
            .with_header("X-Token", "abc")
            .with_body("data");

        let hyper_req = req.into_hyper().unwrap();
        assert_eq!(hyper_req.uri().to_string(), "http://example.test:80/x");
        assert_eq!(hyper_req.headers()["x-token"], "abc");
        let body = hyper_req.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("data"));
    }
}
