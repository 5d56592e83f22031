//! Per-release build pipeline.
//!
//! 1. resolve metadata (catalog name, cover source)
//! 2. locate the release in the archive and collect its links
//! 3. fetch every article, in order, through the same session
//! 4. compare the content digest with the last build
//! 5. package, convert, record the digest
//!
//! The digest is only recorded once every requested format exists, so a
//! failed conversion is retried on the next run.
//! Metadata is resolved even when the content turns out to be unchanged.
//! Artwork the resolver extracted to a temporary file is removed once the
//! release is done, whatever the outcome.

use crate::api::HttpClient;
use crate::config::Config;
use crate::digest::{DigestStore, has_changed, record_build};
use crate::error::{Error, Result};
use crate::metadata::ReleaseResolver;
use crate::models::{ArticleRecord, ReleaseDescriptor, ReleaseMetadata};
use crate::outputs::convert::{OutputFormat, convert_all};
use crate::outputs::cover::load_cover;
use crate::outputs::epub::{Book, fetch_images, write_epub};
use crate::outputs::json::write_manifest;
use crate::scrapers::article::fetch_article;
use crate::scrapers::navigator::Navigator;
use crate::session::BrowserSession;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
    /// Rebuild even when the digest matches the last build.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Built { paths: Vec<PathBuf> },
    Unchanged,
}

impl fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseOutcome::Built { paths } => write!(f, "built {} file(s)", paths.len()),
            ReleaseOutcome::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Everything one release build needs. The session is borrowed exclusively.
pub struct Pipeline<'a, S, C, D> {
    pub session: &'a mut S,
    pub client: &'a C,
    pub store: &'a D,
    pub config: &'a Config,
    pub options: &'a PipelineOptions,
}

impl<S, C, D> Pipeline<'_, S, C, D>
where
    S: BrowserSession,
    C: HttpClient,
    D: DigestStore,
{
    #[instrument(level = "info", skip_all, fields(release = %descriptor.code))]
    pub async fn process_release(&mut self, descriptor: &ReleaseDescriptor) -> Result<ReleaseOutcome> {
        let (meta, extracted) = self.resolve_metadata(descriptor).await?;
        let outcome = self.build(&meta).await;

        if let Some(path) = meta.local_image_path().filter(|_| extracted) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed extracted artwork"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not remove extracted artwork"),
            }
        }
        outcome
    }

    /// Metadata for the release and whether its cover is a temporary file.
    ///
    /// Each override replaces its part of the lookup; with both given no
    /// request is made.
    async fn resolve_metadata(&self, descriptor: &ReleaseDescriptor) -> Result<(ReleaseMetadata, bool)> {
        let code = descriptor.code.as_str();
        let resolver = ReleaseResolver::new(
            self.client,
            &self.config.catalog,
            &self.config.artwork,
            self.config.retry.policy(),
        );

        let meta = match (&descriptor.name, &descriptor.cover_url) {
            (None, None) => resolver.resolve(code).await?,
            (name, cover) => {
                let (name, released_at) = match name {
                    Some(name) => (name.clone(), None),
                    None => {
                        let entry = resolver.lookup_catalog(code).await?;
                        (entry.name, entry.released_at)
                    }
                };
                let image_url = match cover {
                    Some(url) => url.clone(),
                    None => resolver.resolve_artwork(code).await?,
                };
                ReleaseMetadata {
                    code: code.to_string(),
                    name,
                    released_at,
                    image_url,
                }
            }
        };

        let extracted = descriptor.cover_url.is_none() && meta.local_image_path().is_some();
        info!(name = %meta.name, cover = %meta.image_url, extracted, "Resolved release metadata");
        Ok((meta, extracted))
    }

    async fn build(&mut self, meta: &ReleaseMetadata) -> Result<ReleaseOutcome> {
        let articles = self.collect_articles(meta).await?;

        if !self.options.force && !has_changed(&meta.code, &articles, self.store).await? {
            info!("Content unchanged since last build; skipping");
            return Ok(ReleaseOutcome::Unchanged);
        }

        let epub = self.package(meta, &articles).await?;
        let paths = convert_all(
            &self.config.tools.converter,
            &epub,
            &self.options.output_dir,
            &self.options.formats,
        )
        .await?;

        let digest = record_build(&meta.code, &articles, self.store).await?;
        debug!(%digest, "Recorded build digest");
        Ok(ReleaseOutcome::Built { paths })
    }

    async fn collect_articles(&mut self, meta: &ReleaseMetadata) -> Result<Vec<ArticleRecord>> {
        let site = &self.config.site;
        let links = Navigator::new(&mut *self.session, site)?
            .locate_release(&meta.name)
            .await?;
        if links.is_empty() {
            return Err(Error::NotFound(format!("articles for release {}", meta.code)));
        }

        let mut articles = Vec::with_capacity(links.len());
        for link in &links {
            articles.push(fetch_article(&mut *self.session, link, site).await?);
        }
        info!(count = articles.len(), "Fetched release articles");
        Ok(articles)
    }

    /// Write the EPUB and the manifest. Returns the EPUB path.
    async fn package(&self, meta: &ReleaseMetadata, articles: &[ArticleRecord]) -> Result<PathBuf> {
        let book = Book::plan(&meta.name, articles)?;
        let images = fetch_images(self.client, &book).await;
        let cover = match load_cover(self.client, meta, &self.config.tools.rasterizer).await {
            Ok(cover) => Some(cover),
            Err(e) => {
                warn!(error = %e, "Cover unavailable; building without one");
                None
            }
        };

        tokio::fs::create_dir_all(&self.options.output_dir).await?;
        let path = self.options.output_dir.join(book.file_name());
        write_epub(&book, &images, cover.as_ref(), &path)?;

        let manifest_dir = self.options.output_dir.join(OutputFormat::Epub.extension());
        write_manifest(&manifest_dir, &meta.code, &book.title, articles).await?;
        Ok(path)
    }
}
