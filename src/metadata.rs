//! Release metadata resolution.
//!
//! The display name and release date come from the public card catalog. The
//! cover comes from the publisher's marketing assets, whose URLs follow a few
//! predictable templates but vary in year and in the case of the release
//! code. Candidates are probed in this order:
//!
//! 1. asset family: high resolution PDF templates, then wallpaper ZIPs
//! 2. template, in configured order
//! 3. case variant: see [`CASE_VARIANTS`]
//! 4. year, from the current year down to `first_year`
//!
//! The first URL whose `HEAD` is anything but "not found" wins. Only the
//! probes go through the retry policy, so a URL counts as missing once its
//! retries are exhausted. The catalog request and the ZIP download are single
//! attempts. A winning ZIP is downloaded and the entry carrying the resolution
//! marker is extracted to a temporary file.

use crate::api::{HttpClient, RetryPolicy, RetryingClient};
use crate::config::{
    ArtworkConfig, CODE_PLACEHOLDER, CatalogConfig, FILE_CODE_PLACEHOLDER, PATH_CODE_PLACEHOLDER,
    YEAR_PLACEHOLDER,
};
use crate::error::{Error, Result};
use crate::models::ReleaseMetadata;
use chrono::{Datelike, Local};
use itertools::Itertools;
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Lower,
    Upper,
}

impl Case {
    fn apply(self, code: &str) -> String {
        match self {
            Case::Lower => code.to_lowercase(),
            Case::Upper => code.to_uppercase(),
        }
    }
}

/// `(path code, file code)` case combinations in probe order.
pub const CASE_VARIANTS: [(Case, Case); 4] = [
    (Case::Lower, Case::Lower),
    (Case::Upper, Case::Lower),
    (Case::Lower, Case::Upper),
    (Case::Upper, Case::Upper),
];

/// Name and date as reported by the card catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub released_at: Option<String>,
}

/// Expand one template into every candidate URL, in probe order.
pub fn candidate_urls(template: &str, code: &str, first_year: i32, current_year: i32) -> Vec<String> {
    let mut urls = Vec::with_capacity(CASE_VARIANTS.len() * 8);
    for (path_case, file_case) in CASE_VARIANTS {
        let path_code = path_case.apply(code);
        let file_code = file_case.apply(code);
        for year in (first_year..=current_year).rev() {
            urls.push(
                template
                    .replace(YEAR_PLACEHOLDER, &year.to_string())
                    .replace(PATH_CODE_PLACEHOLDER, &path_code)
                    .replace(FILE_CODE_PLACEHOLDER, &file_code),
            );
        }
    }
    urls.into_iter().unique().collect()
}

pub struct ReleaseResolver<'a, C: HttpClient> {
    client: &'a C,
    prober: RetryingClient<&'a C>,
    catalog: &'a CatalogConfig,
    artwork: &'a ArtworkConfig,
    current_year: i32,
}

impl<'a, C: HttpClient> ReleaseResolver<'a, C> {
    /// `probe_policy` applies to artwork `HEAD` probes only.
    pub fn new(
        client: &'a C,
        catalog: &'a CatalogConfig,
        artwork: &'a ArtworkConfig,
        probe_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            prober: RetryingClient::new(client, probe_policy),
            catalog,
            artwork,
            current_year: Local::now().year(),
        }
    }

    /// Probe years up to `year` instead of the current one.
    #[cfg(test)]
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    /// Resolve name, release date and cover source for `code`.
    #[instrument(level = "info", skip(self))]
    pub async fn resolve(&self, code: &str) -> Result<ReleaseMetadata> {
        let entry = self.lookup_catalog(code).await?;
        let image_url = self.resolve_artwork(code).await?;
        Ok(ReleaseMetadata {
            code: code.to_string(),
            name: entry.name,
            released_at: entry.released_at,
            image_url,
        })
    }

    /// Single catalog request; any failure is [`Error::MetadataUnavailable`].
    pub async fn lookup_catalog(&self, code: &str) -> Result<CatalogEntry> {
        let unavailable = |reason: String| Error::MetadataUnavailable {
            code: code.to_string(),
            reason,
        };
        let url = self
            .catalog
            .url_template
            .replace(CODE_PLACEHOLDER, &urlencoding::encode(&code.to_lowercase()));

        let response = self
            .client
            .get(&url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.is_success() {
            return Err(unavailable(format!("{url} answered {}", response.status)));
        }
        let entry: CatalogEntry = serde_json::from_slice(&response.body)
            .map_err(|e| unavailable(format!("unreadable catalog entry: {e}")))?;
        info!(name = %entry.name, released_at = ?entry.released_at, "Catalog entry found");
        Ok(entry)
    }

    /// URL of the PDF cover, or the local path of an extracted wallpaper.
    pub async fn resolve_artwork(&self, code: &str) -> Result<String> {
        if let Some(url) = self.first_available(&self.artwork.pdf_templates, code).await {
            return Ok(url);
        }
        debug!("No PDF artwork; trying wallpaper bundles");
        if let Some(url) = self.first_available(&self.artwork.zip_templates, code).await {
            return self.extract_wallpaper(code, &url).await;
        }
        warn!("Artwork candidates exhausted");
        Err(Error::ReleaseArtworkNotFound {
            code: code.to_string(),
        })
    }

    async fn first_available(&self, templates: &[String], code: &str) -> Option<String> {
        for template in templates {
            for url in candidate_urls(template, code, self.artwork.first_year, self.current_year) {
                match self.prober.head(&url).await {
                    Ok(response) if !response.is_not_found() => {
                        info!(%url, status = response.status, "Found release artwork");
                        return Some(url);
                    }
                    Ok(_) => debug!(%url, "Artwork candidate not found"),
                    Err(e) => warn!(%url, error = %e, "Artwork probe failed"),
                }
            }
        }
        None
    }

    #[instrument(level = "info", skip(self))]
    async fn extract_wallpaper(&self, code: &str, url: &str) -> Result<String> {
        let not_found = || Error::ReleaseArtworkNotFound {
            code: code.to_string(),
        };
        let response = self.client.get(url).await?;
        if !response.is_success() {
            warn!(status = response.status, "Wallpaper bundle download failed");
            return Err(not_found());
        }

        let mut archive = ZipArchive::new(Cursor::new(response.body))?;
        let marker = &self.artwork.resolution_marker;
        let Some(name) = archive
            .file_names()
            .find(|name| name.contains(marker.as_str()) && !name.ends_with('/'))
            .map(str::to_string)
        else {
            warn!(%marker, entries = archive.len(), "No wallpaper with resolution marker");
            return Err(not_found());
        };

        let mut entry = archive.by_name(&name)?;
        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_string();
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_cover_", code.to_lowercase()))
            .suffix(&format!(".{extension}"))
            .tempfile()?;
        std::io::copy(&mut entry, &mut file)?;
        let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;

        info!(entry = %name, path = %path.display(), "Extracted wallpaper");
        Ok(path.to_string_lossy().into_owned())
    }
}
