//! HTTP transport collaborator
//!
//! The retrieval routine talks to the wire through the [`Transport`] trait:
//! `reset` clears per-attempt state, `add_header` stages request headers, and
//! `get` issues the request and streams the body into the caller's sink.
//! Tests substitute a scripted stub; production uses [`HyperTransport`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Empty};
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::io::{Seek, Write};
use std::time::Duration;

use crate::s3::client::{Result, S3Error};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// The caller-supplied destination for retrieved bytes.
///
/// Seekability is required so the retrieval routine can rewind to the
/// position it started at before every retry attempt.
pub trait ObjectSink: Write + Seek {}

impl<T: Write + Seek> ObjectSink for T {}

/// An HTTP GET collaborator the retrieval routine drives per attempt.
#[async_trait]
pub trait Transport {
    /// Drop transient per-attempt state (staged headers).
    fn reset(&mut self);

    /// Stage a header for the next request.
    fn add_header(&mut self, name: &str, value: &str);

    /// Issue `GET https://<host><path>?<query>` and return the response
    /// status. A 200 body is streamed into `sink`; non-200 bodies (error
    /// documents) are drained without touching the sink, so a failed attempt
    /// followed by a rewind can never leave stale bytes behind the next
    /// attempt's content.
    ///
    /// Sink write failures surface as [`S3Error::Io`]; everything else
    /// (connect, TLS, protocol) surfaces as [`S3Error::Request`] so the
    /// caller can treat it as one more failed attempt.
    async fn get(
        &mut self,
        host: &str,
        path: &str,
        query: &str,
        sink: &mut (dyn ObjectSink + Send),
    ) -> Result<StatusCode>;
}

/// Production transport over the hyper 1.x legacy client with native-tls.
///
/// HTTP/1.1 only, TCP_NODELAY, 10s connect timeout. Constructed fresh per
/// retrieval call; there is no connection pooling across calls.
pub struct HyperTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    headers: Vec<(String, String)>,
}

impl HyperTransport {
    pub fn new() -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));

        let tls = TlsConnector::new()
            .map_err(|e| S3Error::Request(format!("TLS connector: {}", e)))?;
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            headers: Vec::new(),
        })
    }

    /// Percent-encode an object path, preserving forward slashes.
    pub fn encode_path(path: &str) -> String {
        let mut result = String::with_capacity(path.len() + 16);
        for byte in path.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        result
    }

    fn build_url(host: &str, path: &str, query: &str) -> String {
        let encoded = Self::encode_path(path);
        let mut url = String::with_capacity(8 + host.len() + encoded.len() + 1 + query.len());
        url.push_str("https://");
        url.push_str(host);
        url.push_str(&encoded);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl Transport for HyperTransport {
    fn reset(&mut self) {
        self.headers.clear();
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    async fn get(
        &mut self,
        host: &str,
        path: &str,
        query: &str,
        sink: &mut (dyn ObjectSink + Send),
    ) -> Result<StatusCode> {
        let url = Self::build_url(host, path, query);

        let mut req = Request::builder().method(Method::GET).uri(&url);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        let request = req
            .body(Empty::new())
            .map_err(|e| S3Error::Request(format!("request build: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| S3Error::Request(format!("request failed: {}", e)))?;
        let status = response.status();

        if status != StatusCode::OK {
            // Drain the error document so the connection can be reused.
            let body = response
                .collect()
                .await
                .map(|b| b.to_bytes())
                .unwrap_or_default();
            tracing::debug!(%status, %url, body = %String::from_utf8_lossy(&body), "non-200 response");
            return Ok(status);
        }

        // Stream body frames into the sink. Sync writes are fine here: the
        // sink is a file or in-memory buffer, one operation in flight.
        let mut body = BodyStream::new(response.into_body());
        while let Some(frame) = body.next().await {
            let frame = frame.map_err(|e| S3Error::Request(format!("body: {}", e)))?;
            if let Some(chunk) = frame.data_ref() {
                sink.write_all(chunk)?;
            }
        }
        sink.flush()?;

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_path_preserves_slashes() {
        assert_eq!(HyperTransport::encode_path("/data.csv"), "/data.csv");
        assert_eq!(
            HyperTransport::encode_path("/dir name/file.txt"),
            "/dir%20name/file.txt"
        );
        assert_eq!(HyperTransport::encode_path("/a+b"), "/a%2Bb");
    }

    #[test]
    fn build_url_with_and_without_query() {
        assert_eq!(
            HyperTransport::build_url("b.s3.amazonaws.com", "/k", ""),
            "https://b.s3.amazonaws.com/k"
        );
        assert_eq!(
            HyperTransport::build_url("b.s3.amazonaws.com", "/k", "versionId=1"),
            "https://b.s3.amazonaws.com/k?versionId=1"
        );
    }
}
