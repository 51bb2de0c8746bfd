use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode, Url};
use serde::Deserialize;

use crate::annotation::{RawAnnotation, ReferenceImage};
use crate::error::{QcError, QcResult};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Where annotations and reference images come from.
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// The annotation for a style in a size with its reference image
    /// attached, or `None` when nothing was annotated.
    async fn fetch_annotation(&self, article_style: &str, size: &str)
        -> QcResult<Option<RawAnnotation>>;
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope {
    #[serde(default, alias = "image_data", alias = "imageBase64", alias = "image_base64")]
    data: Option<String>,
    #[serde(default, alias = "mime_type", alias = "mimeType", alias = "image_mime_type")]
    mime: Option<String>,
}

/// Read-only client for the content API.
pub struct HttpCatalogClient {
    http: Client,
    base_url: Url,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build catalog HTTP client")?;

        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid catalog base URL {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Catalog base URL {base_url} cannot carry a path");
        }

        Ok(Self { http, base_url })
    }

    /// `{base}/annotations/{style}/{size}` with both labels escaped as path
    /// segments.
    fn annotation_url(&self, article_style: &str, size: &str) -> QcResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QcError::CatalogUnavailable(format!("unusable base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["annotations", article_style, size.trim()]);
        Ok(url)
    }

    async fn fetch_image(&self, mut url: Url) -> QcResult<Option<ReferenceImage>> {
        url.path_segments_mut()
            .map_err(|_| QcError::CatalogUnavailable("unusable image URL".into()))?
            .push("image");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| QcError::CatalogUnavailable(format!("reference image: {err}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(QcError::CatalogUnavailable(format!(
                "reference image returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| QcError::CatalogUnavailable(format!("reference image: {err}")))?;

        Ok(decode_image(content_type.as_deref(), &bytes))
    }
}

/// Binary bodies are base64-encoded here; JSON bodies carry the payload
/// already encoded.
fn decode_image(content_type: Option<&str>, bytes: &[u8]) -> Option<ReferenceImage> {
    if bytes.is_empty() {
        return None;
    }

    if content_type == Some("application/json") {
        let envelope: ImageEnvelope = match serde_json::from_slice(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                log_warn!("Unreadable reference image envelope: {err}");
                return None;
            }
        };
        let data = envelope.data.filter(|data| !data.trim().is_empty())?;
        // Some producers store data URLs.
        let (mime_from_url, base64) = match data.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((mime, payload)) => (Some(mime.to_string()), payload.to_string()),
                None => (None, data.clone()),
            },
            None => (None, data),
        };
        return Some(ReferenceImage {
            base64,
            mime_type: envelope.mime.or(mime_from_url),
        });
    }

    Some(ReferenceImage {
        base64: STANDARD.encode(bytes),
        mime_type: content_type
            .filter(|mime| mime.starts_with("image/"))
            .map(str::to_string),
    })
}

#[async_trait]
impl AnnotationSource for HttpCatalogClient {
    async fn fetch_annotation(
        &self,
        article_style: &str,
        size: &str,
    ) -> QcResult<Option<RawAnnotation>> {
        let url = self.annotation_url(article_style, size)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| QcError::CatalogUnavailable(format!("annotation: {err}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            log_info!("No annotation stored for {article_style} size {size}");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(QcError::CatalogUnavailable(format!(
                "annotation returned {}",
                response.status()
            )));
        }

        let mut annotation: RawAnnotation = response
            .json()
            .await
            .map_err(|err| QcError::malformed(format!("annotation record is not valid JSON: {err}")))?;
        annotation.image = self.fetch_image(url).await?;

        Ok(Some(annotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_image_is_base64_encoded_with_header_mime() {
        let image = decode_image(Some("image/png"), &[0x89, b'P', b'N', b'G']).unwrap();

        assert_eq!(image.base64, "iVBORw==");
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn json_envelope_passes_payload_through() {
        let body = br#"{"image_data": "aGVsbG8=", "mimeType": "image/webp"}"#;

        let image = decode_image(Some("application/json"), body).unwrap();

        assert_eq!(image.base64, "aGVsbG8=");
        assert_eq!(image.mime_type.as_deref(), Some("image/webp"));
    }

    #[test]
    fn data_url_envelope_is_split() {
        let body = br#"{"imageBase64": "data:image/png;base64,aGVsbG8="}"#;

        let image = decode_image(Some("application/json"), body).unwrap();

        assert_eq!(image.base64, "aGVsbG8=");
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn empty_or_unusable_bodies_yield_nothing() {
        assert!(decode_image(Some("image/jpeg"), &[]).is_none());
        assert!(decode_image(Some("application/json"), b"{}").is_none());
        assert!(decode_image(Some("application/json"), b"not json").is_none());
    }

    fn client(base_url: &str) -> HttpCatalogClient {
        HttpCatalogClient::new(base_url, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn annotation_url_escapes_style_and_size() {
        let url = client("http://127.0.0.1:8000/api")
            .annotation_url("NKE TS/001", " XL ")
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8000/api/annotations/NKE%20TS%2F001/XL"
        );
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let url = client("http://catalog.local/api/")
            .annotation_url("NKE-TS-001", "M")
            .unwrap();

        assert_eq!(url.as_str(), "http://catalog.local/api/annotations/NKE-TS-001/M");
    }

    #[test]
    fn base_url_must_be_hierarchical() {
        assert!(HttpCatalogClient::new("mailto:qc@example.com", Duration::from_secs(1)).is_err());
        assert!(HttpCatalogClient::new("not a url", Duration::from_secs(1)).is_err());
    }
}
