//! Byte-stream access to a rendition's source locator.

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::catalog::Rendition;
use crate::error::DeliveryError;

/// Chunked byte stream of one rendition's payload.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Opens source streams and probes payload lengths over HTTP.
pub struct StreamMaterializer {
    client: reqwest::Client,
}

impl StreamMaterializer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Opens a GET stream for the rendition's locator. No retries; any
    /// transport failure propagates as [`DeliveryError::StreamOpen`].
    pub async fn open(&self, rendition: &Rendition) -> Result<ByteStream, DeliveryError> {
        let response = self
            .client
            .get(&rendition.source_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(DeliveryError::StreamOpen)?;

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)),
        ))
    }

    /// Issues a body-less HEAD request to recover the payload length when
    /// the catalog did not report one. Length is advisory (it only feeds a
    /// response header), so probe failures are logged and degrade to `None`.
    ///
    /// The `Content-Length` header is read directly: a HEAD response has no
    /// body, so body-size accessors report zero rather than the advertised
    /// payload length.
    pub async fn probe_length(&self, url: &str) -> Option<u64> {
        let result = self
            .client
            .head(url)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(response) => response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok()?.parse::<u64>().ok()),
            Err(err) => {
                warn!("content-length probe failed: {err}");
                None
            }
        }
    }
}

impl Default for StreamMaterializer {
    fn default() -> Self {
        Self::new()
    }
}
