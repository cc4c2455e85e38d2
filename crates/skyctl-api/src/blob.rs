// BLOB payload retrieval.
//
// INDIGO servers deliver images either inline (base64 in the item value)
// or as a URL the client downloads over plain HTTP from the same host.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Resolves a BLOB item value into raw bytes.
#[derive(Debug, Clone)]
pub struct BlobFetcher {
    http: reqwest::Client,
    base: Url,
}

impl BlobFetcher {
    /// Create a fetcher resolving relative BLOB URLs against `base`
    /// (see [`crate::transport::http_base`]).
    pub fn new(base: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base,
        })
    }

    /// Fetch the payload referenced by a BLOB item value.
    pub async fn fetch(&self, value: &str) -> Result<Vec<u8>, Error> {
        match classify(value) {
            BlobSource::Url(url) => self.download(url).await,
            BlobSource::Path(path) => {
                let url = self.base.join(path)?;
                self.download(url.as_str()).await
            }
            BlobSource::Inline(data) => decode_inline(data),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, Error> {
        tracing::debug!(url, "downloading BLOB");
        let resp = self.http.get(url).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        tracing::debug!(len = bytes.len(), "BLOB downloaded");
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BlobSource<'a> {
    Url(&'a str),
    Path(&'a str),
    Inline(&'a str),
}

fn classify(value: &str) -> BlobSource<'_> {
    if value.starts_with("http://") || value.starts_with("https://") {
        BlobSource::Url(value)
    } else if value.starts_with('/') {
        BlobSource::Path(value)
    } else {
        BlobSource::Inline(value)
    }
}

/// Decode an inline base64 payload.
pub fn decode_inline(data: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Blob(format!("invalid base64 payload: {e}")))
}

/// Encode bytes for inline delivery.
pub fn encode_inline(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classifies_values() {
        assert_eq!(
            classify("http://host:7624/blob/1.fits"),
            BlobSource::Url("http://host:7624/blob/1.fits")
        );
        assert_eq!(classify("/blob/0x1.fits"), BlobSource::Path("/blob/0x1.fits"));
        assert_eq!(classify("U0lNUExF"), BlobSource::Inline("U0lNUExF"));
    }

    #[test]
    fn inline_payload_decodes() {
        assert_eq!(decode_inline(&encode_inline(b"SIMPLE  = T")).unwrap(), b"SIMPLE  = T");
        assert!(matches!(decode_inline("***"), Err(Error::Blob(_))));
    }
}
