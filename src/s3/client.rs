//! Authenticated object retrieval with bounded retry
//!
//! [`Connection`] holds an immutable credential pair and exposes the two
//! retrieval entry points: [`Connection::get`] streams an object into a
//! caller-supplied sink, [`Connection::get_string`] buffers it in memory.
//! One HTTP-date and one signature are computed per call and shared by every
//! retry attempt; the server's clock-skew window (15 minutes) comfortably
//! covers a five-attempt budget.

use hyper::StatusCode;
use std::collections::BTreeMap;
use std::io::{Cursor, Seek, SeekFrom};
use thiserror::Error;

use crate::config::Credentials;
use crate::s3::signer::S3SignerV2;
use crate::s3::transport::{HyperTransport, ObjectSink, Transport};

/// Retry budget used when the caller does not supply one.
pub const DEFAULT_RETRIES: usize = 5;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    /// Transport-level failure (connect, TLS, protocol). Retried like any
    /// non-200 response while the budget lasts.
    #[error("request error: {0}")]
    Request(String),

    /// Sink write or seek failure. Never retried.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The retry budget ran out without a 200 response.
    #[error("retries exhausted after {attempts} attempts (last status: {last_status:?})")]
    RetriesExhausted {
        attempts: usize,
        last_status: Option<StatusCode>,
    },

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, S3Error>;

/// An S3 connection: a credential pair plus the retrieval routine.
///
/// Immutable after construction; shared references can issue retrievals from
/// multiple tasks concurrently as long as each call gets its own sink.
pub struct Connection {
    credentials: Credentials,
}

impl Connection {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build a connection from `AWS_ACCESS_ID` / `AWS_SECRET_KEY`.
    ///
    /// Fails loudly when either variable is missing rather than carrying an
    /// empty credential into every request.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(Credentials::from_env()?))
    }

    /// Download an object into `sink`, retrying up to `retries` times.
    ///
    /// Returns `Ok(true)` once an attempt answers 200, `Ok(false)` when the
    /// budget is exhausted (including `retries == 0`, which performs no
    /// attempts at all). Sink IO failures abort immediately with `Err`.
    ///
    /// A fresh transport is constructed for the call; use
    /// [`Connection::get_with`] to supply your own.
    pub async fn get<W>(
        &self,
        bucket: &str,
        object: &str,
        sink: &mut W,
        retries: usize,
    ) -> Result<bool>
    where
        W: ObjectSink + Send,
    {
        let mut transport = HyperTransport::new()?;
        self.get_with(&mut transport, bucket, object, sink, retries)
            .await
    }

    /// [`Connection::get`] over a caller-supplied transport.
    pub async fn get_with<T, W>(
        &self,
        transport: &mut T,
        bucket: &str,
        object: &str,
        sink: &mut W,
        retries: usize,
    ) -> Result<bool>
    where
        T: Transport + Send,
        W: ObjectSink + Send,
    {
        let status = self.fetch(transport, bucket, object, sink, retries).await?;
        Ok(status == Some(StatusCode::OK))
    }

    /// Download an object into memory and return it as a `String`.
    ///
    /// `Ok(body)` on success; [`S3Error::RetriesExhausted`] once the budget
    /// runs out, so a body that happens to contain the word "Error" is never
    /// ambiguous.
    pub async fn get_string(&self, bucket: &str, object: &str, retries: usize) -> Result<String> {
        let mut transport = HyperTransport::new()?;
        self.get_string_with(&mut transport, bucket, object, retries)
            .await
    }

    /// [`Connection::get_string`] over a caller-supplied transport.
    pub async fn get_string_with<T>(
        &self,
        transport: &mut T,
        bucket: &str,
        object: &str,
        retries: usize,
    ) -> Result<String>
    where
        T: Transport + Send,
    {
        let mut sink = Cursor::new(Vec::new());
        let status = self
            .fetch(transport, bucket, object, &mut sink, retries)
            .await?;
        if status == Some(StatusCode::OK) {
            Ok(String::from_utf8(sink.into_inner())?)
        } else {
            Err(S3Error::RetriesExhausted {
                attempts: retries,
                last_status: status,
            })
        }
    }

    /// One algorithm behind both entry points. Returns the status of the
    /// final attempt, `None` when no attempt produced a response.
    async fn fetch<T, W>(
        &self,
        transport: &mut T,
        bucket: &str,
        object: &str,
        sink: &mut W,
        retries: usize,
    ) -> Result<Option<StatusCode>>
    where
        T: Transport + Send,
        W: ObjectSink + Send,
    {
        // Rewind target: whatever the sink held before this call stays put,
        // everything a failed attempt wrote gets overwritten.
        let position = sink.stream_position()?;

        let path = canonical_object_path(object);
        let host = format!("{}.s3.amazonaws.com", bucket);
        let resource = format!("/{}{}", bucket, path);

        // One date, one signature, shared by every attempt.
        let date = S3SignerV2::http_date();
        let signer = S3SignerV2::new(self.credentials.secret_key.clone());
        let signature = signer.sign("GET", "", "", &date, &BTreeMap::new(), &resource);
        let authorization = S3SignerV2::authorization(&self.credentials.access_id, &signature);

        // "Not yet 200" sentinel: no attempt has produced a response.
        let mut status: Option<StatusCode> = None;
        let mut attempt = 0;
        while status != Some(StatusCode::OK) && attempt < retries {
            sink.seek(SeekFrom::Start(position))?;
            transport.reset();
            transport.add_header("User-Agent", USER_AGENT);
            transport.add_header("Date", &date);
            transport.add_header("Authorization", &authorization);

            match transport.get(&host, &path, "", sink).await {
                Ok(s) => {
                    tracing::debug!(attempt, status = %s, %host, %path, "attempt finished");
                    status = Some(s);
                }
                Err(S3Error::Io(e)) => return Err(S3Error::Io(e)),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, %host, %path, "attempt failed");
                    status = None;
                }
            }
            attempt += 1;
        }

        if status != Some(StatusCode::OK) {
            tracing::warn!(attempts = attempt, ?status, %host, %path, "retrieval failed");
        }
        Ok(status)
    }
}

/// Object paths are keyed under the bucket root; accept `data.csv` and
/// `/data.csv` as the same object.
fn canonical_object_path(object: &str) -> String {
    if object.starts_with('/') {
        object.to_string()
    } else {
        format!("/{}", object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_gains_leading_slash() {
        assert_eq!(canonical_object_path("data.csv"), "/data.csv");
        assert_eq!(canonical_object_path("/data.csv"), "/data.csv");
        assert_eq!(canonical_object_path("/a/b/c"), "/a/b/c");
    }
}
