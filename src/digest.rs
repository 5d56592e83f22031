//! Change detection over a release's article texts.
//!
//! The digest is a SHA-256 over the article `text` fields joined with `\n`
//! in fetched order, so reordering articles changes it. Digests are stored
//! one file per release under `<root>/<code>/content.sha256`, the code
//! lowercased; a missing file simply means "never built".
//!
//! Writes are not coordinated: callers serialize writers for the same code.

use crate::error::Result;
use crate::models::{ArticleRecord, ContentDigest};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, instrument};

const DIGEST_FILE: &str = "content.sha256";

/// Compute the content digest of an ordered article set.
pub fn digest(articles: &[ArticleRecord]) -> ContentDigest {
    let mut hasher = Sha256::new();
    for (i, article) in articles.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(article.text.as_bytes());
    }
    ContentDigest::from_hex(hex::encode(hasher.finalize()))
}

/// Key-value storage for digests.
pub trait DigestStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Filesystem-backed [`DigestStore`].
#[derive(Debug, Clone)]
pub struct FsDigestStore {
    root: PathBuf,
}

impl FsDigestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.to_lowercase()).join(DIGEST_FILE)
    }
}

impl DigestStore for FsDigestStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, value).await?;
        debug!(path = %path.display(), "Stored digest");
        Ok(())
    }
}

/// Whether the articles differ from the last successful build of `release_code`.
#[instrument(level = "info", skip(articles, store))]
pub async fn has_changed<D: DigestStore>(
    release_code: &str,
    articles: &[ArticleRecord],
    store: &D,
) -> Result<bool> {
    let fresh = digest(articles);
    let changed = match store.read(release_code).await? {
        None => true,
        Some(stored) => stored.as_slice() != fresh.as_str().as_bytes(),
    };
    info!(digest = %fresh, changed, "Compared content digest");
    Ok(changed)
}

/// Record the digest of a successful build.
pub async fn record_build<D: DigestStore>(
    release_code: &str,
    articles: &[ArticleRecord],
    store: &D,
) -> Result<ContentDigest> {
    let fresh = digest(articles);
    store.write(release_code, fresh.as_str().as_bytes()).await?;
    Ok(fresh)
}
