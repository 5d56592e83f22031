//! JSON manifest of the articles that went into a book.
//!
//! Written next to the final EPUB as `<code>.articles.json`:
//! ```text
//! output_dir/
//! └── epub/
//!     ├── Magic: The Gathering - Murders at Karlov Manor.epub
//!     └── mkm.articles.json
//! ```

use crate::error::Result;
use crate::models::ArticleRecord;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Serialize)]
struct Manifest<'a> {
    release: &'a str,
    title: &'a str,
    articles: &'a [ArticleRecord],
}

/// Serialize the article set of one release into `dir`.
///
/// # Returns
///
/// The path of the written manifest.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), %code))]
pub async fn write_manifest(
    dir: &Path,
    code: &str,
    title: &str,
    articles: &[ArticleRecord],
) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(&Manifest {
        release: code,
        title,
        articles,
    })?;

    if let Err(e) = fs::create_dir_all(dir).await {
        error!(error = %e, "Failed to create manifest dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{}.articles.json", code.to_lowercase()));
    fs::write(&path, json).await?;
    info!(path = %path.display(), count = articles.len(), "Wrote article manifest");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let articles = vec![ArticleRecord {
            title: "Side Stories: Alley Cats".into(),
            category: "Side Stories".into(),
            url: "https://magic.wizards.com/en/news/mkm/alley-cats".into(),
            author: String::new(),
            publish_date: "January 18, 2024".into(),
            text: "<p>Ravnica</p>".into(),
        }];

        let path = write_manifest(&dir.path().join("epub"), "MKM", "Book", &articles)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("epub").join("mkm.articles.json"));

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["release"], "MKM");
        assert_eq!(value["articles"][0]["category"], "Side Stories");
        let back: Vec<ArticleRecord> = serde_json::from_value(value["articles"].clone()).unwrap();
        assert_eq!(back, articles);
    }
}
