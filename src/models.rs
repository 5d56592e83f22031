//! Data models passed between pipeline stages.
//!
//! - [`LinkRecord`]: one article teaser found under a category tab
//! - [`ArticleRecord`]: a fetched and sanitized article
//! - [`ReleaseMetadata`]: display name, date and cover source for a release
//! - [`ReleaseDescriptor`]: one entry of a batch file
//! - [`ContentDigest`]: change-detection fingerprint over article texts
//!
//! Link and article records live only for one release's processing.
//! Metadata and digests are persisted by the outer layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An article teaser collected from the story archive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Label of the category tab that was active when the teaser was found.
    pub category: String,
    /// Heading text of the teaser, as shown in the listing.
    pub title: String,
    /// Absolute URL of the article page.
    pub url: String,
}

/// A fully fetched article.
///
/// `text` is a sanitized HTML fragment: it carries no disallowed markup and
/// never starts with an empty paragraph, a rule or a whitespace-only text node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub category: String,
    pub url: String,
    /// Empty when the article header names no author.
    pub author: String,
    /// Free-form date text as rendered on the page.
    pub publish_date: String,
    pub text: String,
}

/// Resolved information for one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub code: String,
    pub name: String,
    /// Release date reported by the card catalog, when known (`YYYY-MM-DD`).
    pub released_at: Option<String>,
    /// Remote URL or local file path of the cover asset.
    pub image_url: String,
}

impl ReleaseMetadata {
    /// The cover asset as a local path, when it is not a remote URL.
    pub fn local_image_path(&self) -> Option<&Path> {
        if self.image_url.starts_with("http://") || self.image_url.starts_with("https://") {
            None
        } else {
            Some(Path::new(&self.image_url))
        }
    }
}

/// One release to build, as read from the command line or a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Release code, e.g. `mkm`.
    pub code: String,
    /// Display name override; looked up in the card catalog when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Cover URL override; resolved from marketing assets when absent.
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl ReleaseDescriptor {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            cover_url: None,
        }
    }
}

/// Hex-encoded SHA-256 fingerprint of a release's article texts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_image_path() {
        let mut meta = ReleaseMetadata {
            code: "mkm".to_string(),
            name: "Murders at Karlov Manor".to_string(),
            released_at: None,
            image_url: "https://media.example.com/mkm.pdf".to_string(),
        };
        assert_eq!(meta.local_image_path(), None);

        meta.image_url = "/tmp/mkm_cover.jpg".to_string();
        assert_eq!(meta.local_image_path(), Some(Path::new("/tmp/mkm_cover.jpg")));
    }

    #[test]
    fn test_descriptor_deserialization_defaults() {
        let yaml = "- code: mkm\n- code: otj\n  name: Outlaws of Thunder Junction\n";
        let descriptors: Vec<ReleaseDescriptor> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0], ReleaseDescriptor::new("mkm"));
        assert_eq!(
            descriptors[1].name.as_deref(),
            Some("Outlaws of Thunder Junction")
        );
        assert_eq!(descriptors[1].cover_url, None);
    }

    #[test]
    fn test_article_record_serialization() {
        let article = ArticleRecord {
            title: "Side Stories: The Long Night".to_string(),
            category: "Side Stories".to_string(),
            url: "https://example.com/story/1".to_string(),
            author: "Jane Doe".to_string(),
            publish_date: "March 14, 2024".to_string(),
            text: "<p>Text</p>".to_string(),
        };
        let json = serde_json::to_string(&article).unwrap();
        let back: ArticleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, article);
    }
}
