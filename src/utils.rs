//! Utility functions for logging, naming and file system checks.
//!
//! - String truncation for logging HTML bodies
//! - Slugification for chapter and image file names
//! - Link resolution against the site base URL
//! - Output directory validation

use crate::error::{Error, Result};
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes on a character boundary and
/// a byte count indicator is appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Convert a title to a file-name friendly slug.
///
/// Lowercases, drops everything but alphanumerics, spaces and hyphens, then
/// replaces spaces with underscores.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Side Stories: Alley Cats"), "side_stories_alley_cats");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Resolve a possibly relative link against `base`.
pub fn absolutize(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| Error::Config(format!("base url {base}: {e}")))?;
    base.join(href.trim())
        .map(|u| u.to_string())
        .map_err(|e| Error::NotFound(format!("invalid link {href}: {e}")))
}

/// Last path segment of a URL, without query or fragment.
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // probe with a throwaway file
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let result = truncate_for_log("ééé", 3);
        assert_eq!(result, "é…(+4 bytes)");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello_world");
        assert_eq!(slugify_title("Side Stories: Alley Cats"), "side_stories_alley_cats");
        assert_eq!(slugify_title("Multiple   Spaces"), "multiple_spaces");
        assert_eq!(slugify_title("Special@#$Characters"), "specialcharacters");
        assert_eq!(slugify_title("Episode 1 - The Body"), "episode_1_-_the_body");
    }

    #[test]
    fn test_absolutize() {
        let base = "https://magic.wizards.com";
        assert_eq!(
            absolutize(base, "/en/news/story").unwrap(),
            "https://magic.wizards.com/en/news/story"
        );
        assert_eq!(
            absolutize(base, "https://other.example/a").unwrap(),
            "https://other.example/a"
        );
        assert!(matches!(absolutize("not a url", "/a"), Err(Error::Config(_))));
    }

    #[test]
    fn test_url_basename() {
        assert_eq!(
            url_basename("https://media.example.com/images/art%20one.jpg?w=300").as_deref(),
            Some("art one.jpg")
        );
        assert_eq!(url_basename("https://example.com/dir/").as_deref(), Some("dir"));
        assert_eq!(url_basename("not a url"), None);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("books").join("mkm");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }
}
