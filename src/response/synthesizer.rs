//! Response synthesis
//!
//! Turns a raw status / header list / body source triple into a
//! [`MockResponse`] that looks the same whether it came from an interceptor
//! or from the real network.

use crate::response::body::{BodySource, BodyStream, ResponseBody};
use crate::response::headers::{HeaderSet, NormalizedHeaders, RawHeaders};
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder};
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue};
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use std::io::Read;
use tracing::warn;

/// Statuses that never carry a body
pub const BODILESS_STATUS_CODES: [u16; 3] = [204, 205, 304];

const DEFAULT_STATUS: u16 = 200;

pub fn is_bodiless(status: u16) -> bool {
    BODILESS_STATUS_CODES.contains(&status)
}

/// Standard reason phrase for a status code, empty when unknown
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// A reply as produced by a real connection or an interceptor definition
#[derive(Debug, Default)]
pub struct RawResponse {
    pub status: Option<u16>,
    pub status_message: Option<String>,
    pub headers: RawHeaders,
    pub body: BodySource,
}

impl RawResponse {
    pub fn synthesize(self) -> MockResponse {
        synthesize(
            self.status,
            self.status_message.as_deref(),
            &self.headers,
            self.body,
        )
    }
}

/// Build a response from raw parts.
///
/// Never fails: errors from a streaming body source surface on read.
pub fn synthesize(
    status: Option<u16>,
    status_message: Option<&str>,
    raw_headers: &RawHeaders,
    body: BodySource,
) -> MockResponse {
    let status = status.unwrap_or(DEFAULT_STATUS);

    let body = if is_bodiless(status) {
        ResponseBody::Empty
    } else {
        ResponseBody::Stream(BodyStream::from_source(body))
    };

    let status_text = match status_message {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => reason_phrase(status).to_string(),
    };

    let normalized = NormalizedHeaders::normalize(raw_headers);
    let mut headers = HeaderSet::new();
    for header in normalized.iter() {
        headers.set(header.name.clone(), header.joined());
    }

    // set-cookie values must stay separate entries
    let cookies = normalized.values("set-cookie");
    if !cookies.is_empty() {
        headers.delete("set-cookie");
        let name = normalized.canonical_name("set-cookie").unwrap_or("set-cookie");
        for cookie in cookies {
            headers.append(name, cookie.clone());
        }
    }

    MockResponse {
        status,
        status_text,
        headers,
        body,
    }
}

/// A synthesized HTTP response
#[derive(Debug)]
pub struct MockResponse {
    status: u16,
    status_text: String,
    headers: HeaderSet,
    body: ResponseBody,
}

impl MockResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read the whole body as sent, without content decoding
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.collect_bytes().await
    }

    /// Read the body as text, undoing gzip/deflate content encoding
    pub async fn text(self) -> Result<String> {
        let encoding = self
            .headers
            .get("content-encoding")
            .map(|e| e.trim().to_ascii_lowercase());
        let raw = self.body.collect_bytes().await?;
        let decoded = decode_content(encoding.as_deref(), raw)?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let text = self.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Convert into a hyper response. Header casing is not preserved by
    /// hyper's header map; invalid names or values are skipped.
    pub fn into_hyper(self) -> hyper::Response<UnsyncBoxBody<Bytes, EngineError>> {
        let body = match self.body {
            ResponseBody::Empty => Empty::<Bytes>::new()
                .map_err(|never| match never {})
                .boxed_unsync(),
            ResponseBody::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
        };

        let mut response = hyper::Response::new(body);
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in self.headers.iter() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().append(name, value);
                }
                _ => warn!("Skipping header not representable in hyper: {}", name),
            }
        }

        response
    }
}

fn decode_content(encoding: Option<&str>, raw: Bytes) -> Result<Bytes> {
    let mut decoded = Vec::new();
    match encoding {
        Some("gzip") | Some("x-gzip") => {
            GzDecoder::new(&raw[..]).read_to_end(&mut decoded)?;
        }
        Some("deflate") => {
            DeflateDecoder::new(&raw[..]).read_to_end(&mut decoded)?;
        }
        _ => return Ok(raw),
    }
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::body::body_channel;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use futures::StreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn test_default_status_is_200() {
        let response = synthesize(None, None, &RawHeaders::new(), BodySource::from("hi"));
        assert_eq!(response.status(), 200);
        assert_eq!(response.status_text(), "OK");
        assert_eq!(response.text().await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_bodiless_statuses_drop_body() {
        for status in BODILESS_STATUS_CODES {
            let response = synthesize(
                Some(status),
                None,
                &RawHeaders::new(),
                BodySource::from("ignored"),
            );
            assert!(response.body().is_empty(), "status {}", status);
            assert!(response.bytes().await.unwrap().is_empty());
        }
    }

    #[test]
    fn test_status_text_resolution() {
        let not_found = synthesize(Some(404), None, &RawHeaders::new(), BodySource::None);
        assert_eq!(not_found.status_text(), "Not Found");

        let custom = synthesize(Some(404), Some("Gone Fishing"), &RawHeaders::new(), BodySource::None);
        assert_eq!(custom.status_text(), "Gone Fishing");

        let unknown = synthesize(Some(599), None, &RawHeaders::new(), BodySource::None);
        assert_eq!(unknown.status_text(), "");
    }

    #[test]
    fn test_duplicate_header_keeps_first_casing_and_value() {
        let raw = RawHeaders::from_flat([
            "Content-Type",
            "text/plain",
            "content-type",
            "text/html",
        ]);
        let response = synthesize(Some(200), None, &raw, BodySource::None);

        let entries: Vec<_> = response.headers().iter().collect();
        assert_eq!(entries, vec![("Content-Type", "text/plain")]);
    }

    #[test]
    fn test_repeated_header_values_folded() {
        let raw = RawHeaders::from_flat(["Vary", "Accept", "vary", "Origin"]);
        let response = synthesize(Some(200), None, &raw, BodySource::None);

        assert_eq!(response.headers().get_all("vary"), ["Accept, Origin"]);
        assert_eq!(response.headers().iter().next(), Some(("Vary", "Accept, Origin")));
    }

    #[test]
    fn test_set_cookie_values_kept_apart() {
        let raw = RawHeaders::from_flat(["Set-Cookie", "a=1", "X-Id", "7", "Set-Cookie", "b=2"]);
        let response = synthesize(Some(200), None, &raw, BodySource::None);

        assert_eq!(response.headers().get_all("set-cookie"), ["a=1", "b=2"]);
        assert_eq!(response.headers().get("x-id"), Some("7"));
    }

    #[tokio::test]
    async fn test_stream_error_surfaces_on_read_only() {
        let (tx, source) = body_channel(2);
        let response = synthesize(Some(200), None, &RawHeaders::new(), source);
        assert_eq!(response.status(), 200);

        tokio::spawn(async move {
            tx.send("partial").await.unwrap();
            tx.fail("upstream closed").await;
        });

        let err = response.bytes().await.unwrap_err();
        assert!(matches!(err, EngineError::BodySource(_)));
    }

    #[tokio::test]
    async fn test_gzip_body_decoded_as_text() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Lorem ipsum dolor sit amet").unwrap();
        let compressed = encoder.finish().unwrap();

        let raw = RawHeaders::from_flat(["Content-Encoding", "gzip"]);
        let response = synthesize(Some(200), None, &raw, BodySource::from(compressed));
        assert_eq!(response.text().await.unwrap(), "Lorem ipsum dolor sit amet");
    }

    #[tokio::test]
    async fn test_json_body() {
        let response = synthesize(
            Some(200),
            None,
            &RawHeaders::from_flat(["Content-Type", "application/json"]),
            BodySource::from(r#"{"id":3}"#),
        );
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["id"], 3);
    }

    #[tokio::test]
    async fn test_into_hyper() {
        let raw = RawHeaders::from_flat(["Set-Cookie", "a=1", "Set-Cookie", "b=2"]);
        let response = synthesize(Some(201), None, &raw, BodySource::from("made"));

        let hyper_response = response.into_hyper();
        assert_eq!(hyper_response.status(), StatusCode::CREATED);
        assert_eq!(hyper_response.headers().get_all("set-cookie").iter().count(), 2);

        let body = hyper_response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("made"));
    }

    #[tokio::test]
    async fn test_body_streams_in_chunks() {
        let source = BodySource::from_stream(futures::stream::iter(vec![
            Ok(Bytes::from("one")),
            Ok(Bytes::from("two")),
        ]));
        let response = synthesize(Some(200), None, &RawHeaders::new(), source);

        match response.into_body() {
            ResponseBody::Stream(mut stream) => {
                assert_eq!(stream.next().await.unwrap().unwrap(), "one");
                assert_eq!(stream.next().await.unwrap().unwrap(), "two");
                assert!(stream.next().await.is_none());
            }
            ResponseBody::Empty => panic!("expected a body stream"),
        }
    }
}
