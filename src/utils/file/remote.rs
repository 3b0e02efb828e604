//! HTTP transport for remote bigWig files.
//!
//! [`RemoteFile`] issues `Range:`-bounded GET requests against a direct URI,
//! or routes them through a forwarding endpoint
//! (`?r=<start>-<end-1>&q=<uri>`) when the file's server does not allow
//! cross-origin range reads. The total file size is discovered from the
//! `Content-Range` header of a one-byte probe.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// How many times a failed range request is retried before giving up.
pub const N_RETRIES: u32 = 10;

/// Errors surfaced by the transport layer once its retry budget is spent.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("invalid URI `{0}`")]
    InvalidUri(String),
    #[error("range request for {uri} failed with status {status} after {retries} attempts")]
    Status {
        uri: String,
        status: u16,
        retries: u32,
    },
    #[error("network error fetching {uri}: {message}")]
    Network { uri: String, message: String },
    #[error("response for {0} carried no usable Content-Range header")]
    MissingContentRange(String),
}

/// A source of raw byte ranges. The byte-range cache and everything above
/// it are written against this seam, so local files and in-memory images
/// can stand in for HTTP during tests.
#[async_trait]
pub trait RangeSource: Send + Sync + 'static {
    /// Fetches the half-open byte range `[start, end)`.
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes, TransportError>;

    /// Total size of the underlying resource in bytes.
    async fn size(&self) -> Result<u64, TransportError>;
}

/// A remote file addressed by URI, read through HTTP range requests.
#[derive(Debug)]
pub struct RemoteFile {
    client: Client,
    uri: Url,
    forward_uri: Option<Url>,
}

impl RemoteFile {
    pub fn new(uri: &str, forward_uri: Option<&str>) -> Result<Self, TransportError> {
        let uri = Url::parse(uri).map_err(|_| TransportError::InvalidUri(uri.to_string()))?;
        let forward_uri = forward_uri
            .map(|f| Url::parse(f).map_err(|_| TransportError::InvalidUri(f.to_string())))
            .transpose()?;
        Ok(RemoteFile {
            client: Client::new(),
            uri,
            forward_uri,
        })
    }

    async fn send_range(&self, start: u64, end: u64) -> Result<reqwest::Response, TransportError> {
        let mut retries_left = N_RETRIES;
        loop {
            let request = match &self.forward_uri {
                Some(fwd) => self.client.get(fwd.clone()).query(&[
                    ("r", format!("{}-{}", start, end - 1).as_str()),
                    ("q", self.uri.as_str()),
                ]),
                None => self
                    .client
                    .get(self.uri.clone())
                    .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end - 1)),
            };
            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    retries_left -= 1;
                    tracing::warn!(
                        uri = %self.uri,
                        status = %resp.status(),
                        retries_left,
                        "range request failed"
                    );
                    if retries_left == 0 {
                        return Err(TransportError::Status {
                            uri: self.uri.to_string(),
                            status: resp.status().as_u16(),
                            retries: N_RETRIES,
                        });
                    }
                }
                Err(e) => {
                    retries_left -= 1;
                    tracing::warn!(uri = %self.uri, error = %e, retries_left, "range request errored");
                    if retries_left == 0 {
                        return Err(TransportError::Network {
                            uri: self.uri.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Shared range sources forward to their inner value, so a mock or real
/// source can be cloned cheaply and handed to a file while another handle
/// is retained.
#[async_trait]
impl<T: RangeSource + ?Sized> RangeSource for Arc<T> {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes, TransportError> {
        (**self).fetch(start, end).await
    }

    async fn size(&self) -> Result<u64, TransportError> {
        (**self).size().await
    }
}

#[async_trait]
impl RangeSource for RemoteFile {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes, TransportError> {
        let resp = self.send_range(start, end).await?;
        resp.bytes().await.map_err(|e| TransportError::Network {
            uri: self.uri.to_string(),
            message: e.to_string(),
        })
    }

    async fn size(&self) -> Result<u64, TransportError> {
        let resp = self.send_range(0, 1).await?;
        resp.headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range)
            .ok_or_else(|| TransportError::MissingContentRange(self.uri.to_string()))
    }
}

/// Extracts the total-length suffix from a `Content-Range` value, e.g.
/// `bytes 0-0/83257441` -> `83257441`.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BigWigFile;

    #[test]
    fn content_range_total() {
        assert_eq!(total_from_content_range("bytes 0-0/83257441"), Some(83257441));
        assert_eq!(total_from_content_range("bytes 0-0/18446744073709551615"), Some(u64::MAX));
        assert_eq!(total_from_content_range("bytes 0-0/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn invalid_uris_are_rejected() {
        assert!(matches!(
            RemoteFile::new("not a uri", None).unwrap_err(),
            TransportError::InvalidUri(_)
        ));
        assert!(matches!(
            RemoteFile::new("https://example.com/a.bigWig", Some("::nope::")).unwrap_err(),
            TransportError::InvalidUri(_)
        ));
    }

    #[ignore]
    #[tokio::test]
    async fn test_remote() {
        let mut remote = BigWigFile::open_uri(
            "http://hgdownload.soe.ucsc.edu/goldenPath/hg19/encodeDCC/wgEncodeMapability/wgEncodeCrgMapabilityAlign100mer.bigWig",
            None,
            None,
        )
        .unwrap();

        let records = remote
            .query(
                Some(crate::GenomicRange::new("chr17", 0, 100_000)),
                None,
            )
            .await
            .unwrap();
        assert!(!records.is_empty());
    }
}
