//! Scan input and the raw capture taken after render stabilization.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use super::error::ScanError;

/// One audit invocation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRequest {
    url: String,
}

impl ScanRequest {
    /// Validate and build a request. Only absolute `http`/`https` URLs are accepted.
    pub fn new(url: &str) -> Result<Self, ScanError> {
        let trimmed = url.trim();
        let parsed = Url::parse(trimmed).map_err(|e| ScanError::InvalidRequest {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ScanError::InvalidRequest {
                    url: trimmed.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                })
            }
        }

        if parsed.host_str().is_none() {
            return Err(ScanError::InvalidRequest {
                url: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            url: parsed.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Raster encoding of a captured screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Failure to read a screenshot back from its serialized data URL.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotDecodeError {
    #[error("unsupported screenshot media type: {0}")]
    UnsupportedMediaType(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encoded screenshot bytes.
///
/// Serialized as a `data:image/...;base64,` URL so a report can be handed to a
/// browser client unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    format: ImageFormat,
    bytes: Vec<u8>,
}

impl Screenshot {
    pub fn new(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), BASE64.encode(&self.bytes))
    }

    /// Parse a data URL. A bare base64 payload is read as JPEG.
    pub fn from_data_url(value: &str) -> Result<Self, ScreenshotDecodeError> {
        let (format, payload) = match value.strip_prefix("data:") {
            Some(rest) => {
                let (media, payload) = rest
                    .split_once(";base64,")
                    .ok_or_else(|| ScreenshotDecodeError::UnsupportedMediaType(rest.chars().take(32).collect()))?;
                let format = match media {
                    "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
                    "image/png" => ImageFormat::Png,
                    other => return Err(ScreenshotDecodeError::UnsupportedMediaType(other.to_string())),
                };
                (format, payload)
            }
            None => (ImageFormat::Jpeg, value),
        };

        Ok(Self {
            format,
            bytes: BASE64.decode(payload.trim())?,
        })
    }
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screenshot")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for Screenshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for Screenshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Screenshot::from_data_url(&raw).map_err(serde::de::Error::custom)
    }
}

/// Output of the capture stage.
///
/// `page_width`/`page_height` are the full scrollable document size measured
/// after the stabilization sweep, not the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCapture {
    pub screenshot: Screenshot,
    pub page_width: u32,
    pub page_height: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_request_accepts_http_and_https() {
        assert!(ScanRequest::new("https://example.com").is_ok());
        assert!(ScanRequest::new("http://example.com/path?q=1").is_ok());
        assert_eq!(
            ScanRequest::new("  https://example.com ").unwrap().url(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_scan_request_rejects_other_schemes() {
        let err = ScanRequest::new("file:///etc/passwd").unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(err.to_string().contains("unsupported scheme"));

        assert!(ScanRequest::new("not a url").is_err());
        assert!(ScanRequest::new("").is_err());
    }

    #[test]
    fn test_screenshot_data_url_roundtrip() {
        let shot = Screenshot::new(ImageFormat::Jpeg, vec![0xff, 0xd8, 0xff, 0xe0]);
        let url = shot.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(Screenshot::from_data_url(&url).unwrap(), shot);
    }

    #[test]
    fn test_screenshot_bare_base64_reads_as_jpeg() {
        let shot = Screenshot::from_data_url("AAEC").unwrap();
        assert_eq!(shot.format(), ImageFormat::Jpeg);
        assert_eq!(shot.as_bytes(), &[0, 1, 2]);
    }

    #[test]
    fn test_screenshot_rejects_unknown_media_type() {
        let err = Screenshot::from_data_url("data:image/gif;base64,AAAA").unwrap_err();
        assert!(matches!(err, ScreenshotDecodeError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_screenshot_debug_hides_payload() {
        let shot = Screenshot::new(ImageFormat::Png, vec![1; 64]);
        let dbg = format!("{:?}", shot);
        assert!(dbg.contains("len: 64"));
    }
}
