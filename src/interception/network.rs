//! Real network path for requests the gate lets through

use crate::mocking::request::RequestRecord;
use crate::response::body::BodySource;
use crate::response::headers::RawHeaders;
use crate::response::synthesizer::RawResponse;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use tracing::debug;

/// Forwards an unmatched request and returns the raw reply
#[async_trait]
pub trait NetworkPath: Send + Sync {
    async fn forward(&self, request: RequestRecord) -> Result<RawResponse>;
}

/// A network path that refuses every request
#[derive(Debug, Clone, Copy, Default)]
pub struct Unreachable;

#[async_trait]
impl NetworkPath for Unreachable {
    async fn forward(&self, request: RequestRecord) -> Result<RawResponse> {
        Err(EngineError::Network(format!(
            "no network path available for {} {}",
            request.method(),
            request.url()
        )))
    }
}

/// Plain-HTTP pass-through built on the hyper client
pub struct HyperNetwork {
    client: Client<HttpConnector, UnsyncBoxBody<Bytes, EngineError>>,
}

impl HyperNetwork {
    pub fn new() -> Self {
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HyperNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkPath for HyperNetwork {
    async fn forward(&self, request: RequestRecord) -> Result<RawResponse> {
        if request.origin().scheme() != "http" {
            return Err(EngineError::Network(format!(
                "{}: only plain http can be forwarded",
                request.origin()
            )));
        }

        let url = request.url();
        debug!("Forwarding {} {} to the network", request.method(), url);

        let response = self
            .client
            .request(request.into_hyper()?)
            .await
            .map_err(|e| EngineError::Network(format!("{}: {}", url, e)))?;

        let (parts, body) = response.into_parts();

        let mut headers = RawHeaders::new();
        for (name, value) in parts.headers.iter() {
            headers.push(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        let body = TryStreamExt::map_err(body.into_data_stream(), |e| {
            EngineError::BodySource(e.to_string())
        });

        Ok(RawResponse {
            status: Some(parts.status.as_u16()),
            status_message: None,
            headers,
            body: BodySource::from_stream(body),
        })
    }
}
