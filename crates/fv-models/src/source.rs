//! Source descriptors and URL normalization.
//!
//! Accepted URL shapes (scheme and `www.` optional):
//! - `youtube.com/watch?v=VIDEO_ID`
//! - `youtu.be/VIDEO_ID`
//! - `youtube.com/shorts/VIDEO_ID`
//! - `youtube.com/embed/VIDEO_ID`

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Kind of source reference carried on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Remote video page URL
    Url,
    /// File already staged on local disk by the API layer
    Upload,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Url => "url",
            SourceKind::Upload => "upload",
        }
    }
}

/// Source descriptor: kind + locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub locator: String,
}

impl SourceDescriptor {
    pub fn url(locator: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Url,
            locator: locator.into(),
        }
    }

    pub fn upload(path: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Upload,
            locator: path.into(),
        }
    }
}

/// Errors from source normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    #[error("Video ID not found in URL")]
    VideoIdNotFound,

    #[error("Video ID has invalid format: {0}")]
    InvalidVideoId(String),
}

/// A source reference after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedSource {
    /// 11-character platform video ID
    pub source_id: String,
    /// `https://www.youtube.com/watch?v=<id>`
    pub canonical_url: String,
}

impl ResolvedSource {
    fn from_id(id: &str) -> Self {
        Self {
            source_id: id.to_string(),
            canonical_url: format!("https://www.youtube.com/watch?v={}", id),
        }
    }
}

/// Normalize a video URL against the accepted shapes.
pub fn normalize_source_url(raw: &str) -> Result<ResolvedSource, SourceError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SourceError::InvalidUrl(String::new()));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&with_scheme).map_err(|_| SourceError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::InvalidUrl(raw.to_string()));
    }

    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| SourceError::InvalidUrl(raw.to_string()))?;

    let id = match host.as_str() {
        "youtu.be" | "www.youtu.be" => url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .map(str::to_string),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" => extract_from_youtube_path(&url),
        _ => return Err(SourceError::UnsupportedHost(host)),
    };

    let id = id.ok_or(SourceError::VideoIdNotFound)?;
    validate_video_id(&id)?;
    Ok(ResolvedSource::from_id(&id))
}

fn extract_from_youtube_path(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["watch"] => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        ["shorts", id, ..] | ["embed", id, ..] => Some((*id).to_string()),
        _ => None,
    }
}

/// Video IDs are exactly 11 chars of `[A-Za-z0-9_-]`.
fn validate_video_id(id: &str) -> Result<(), SourceError> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if id.len() != 11 || !valid_chars {
        return Err(SourceError::InvalidVideoId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_accepted_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&list=PLrAXtmRdnEQy4qtr",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=30",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1",
        ];
        for url in urls {
            let resolved = normalize_source_url(url).unwrap();
            assert_eq!(resolved.source_id, ID, "url: {}", url);
            assert_eq!(
                resolved.canonical_url,
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
            );
        }
    }

    #[test]
    fn test_rejected_shapes() {
        assert!(matches!(
            normalize_source_url("https://vimeo.com/123456"),
            Err(SourceError::UnsupportedHost(_))
        ));
        assert!(matches!(
            normalize_source_url("https://www.youtube.com/channel/UC123"),
            Err(SourceError::VideoIdNotFound)
        ));
        assert!(matches!(
            normalize_source_url("https://youtu.be/short"),
            Err(SourceError::InvalidVideoId(_))
        ));
        assert!(matches!(
            normalize_source_url("https://youtu.be/dQw4w9WgX!Q"),
            Err(SourceError::InvalidVideoId(_))
        ));
        assert!(normalize_source_url("").is_err());
        assert!(normalize_source_url("ftp://youtube.com/watch?v=dQw4w9WgXcQ").is_err());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let desc = SourceDescriptor::url("https://youtu.be/dQw4w9WgXcQ");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["kind"], "url");
        assert_eq!(json["locator"], "https://youtu.be/dQw4w9WgXcQ");
    }
}
