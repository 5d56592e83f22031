//! Release lookup and link collection in the story archive.
//!
//! The archive shows two horizontally paged sliders inside
//! `section#story-archive`: one of years and one of the releases of the
//! selected year. They are told apart by content. The slider with a label
//! matching the year marker holds years, the other one holds releases.
//!
//! Years are activated in page order and the first release slide whose text
//! contains the release name (case-insensitive) wins. The release code is not
//! matched: short codes occur inside other releases' names.

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use crate::models::LinkRecord;
use crate::session::{BrowserSession, Element};
use crate::utils::absolutize;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, instrument};

/// Drives an exclusively borrowed session through the archive UI.
pub struct Navigator<'a, S: BrowserSession> {
    session: &'a mut S,
    site: &'a SiteConfig,
    year_marker: Regex,
}

impl<'a, S: BrowserSession> Navigator<'a, S> {
    pub fn new(session: &'a mut S, site: &'a SiteConfig) -> Result<Self> {
        let year_marker = Regex::new(&site.year_marker)
            .map_err(|e| Error::Config(format!("site.year_marker: {e}")))?;
        Ok(Self {
            session,
            site,
            year_marker,
        })
    }

    /// Locate a release and collect its article links across every tab.
    ///
    /// `name` is the release display name. Links come back in tab
    /// activation order.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no year page lists the release or a required
    /// tab is missing.
    #[instrument(level = "info", skip(self))]
    pub async fn locate_release(&mut self, name: &str) -> Result<Vec<LinkRecord>> {
        self.session.visit(&self.site.archive_url).await?;
        let release = self.find_release(name).await?;
        release.click().await?;
        self.collect_links().await
    }

    async fn find_release(&self, name: &str) -> Result<S::Element> {
        let matcher = release_matcher(name)?;
        let selectors = &self.site.selectors;

        let archive = self.session.find(&selectors.archive).await?;
        archive.scroll_into_view().await?;
        let (years, releases) = self.find_sliders().await?;

        for year in years.find_all(&selectors.year_item).await? {
            year.click().await?;
            let label = year.text().await?;
            for slide in releases.find_all(&selectors.release_item).await? {
                let text = slide.text().await?;
                if matcher.is_match(&text) {
                    info!(year = %label, release = %text, "Located release");
                    return Ok(slide);
                }
            }
            debug!(year = %label, "Release not listed under year");
        }

        Err(Error::NotFound(format!("release {} in story archive", name.trim())))
    }

    /// Returns `(year slider, release slider)`.
    async fn find_sliders(&self) -> Result<(S::Element, S::Element)> {
        let mut years = None;
        let mut releases = None;

        for slider in self.session.find_all(&self.site.selectors.slider).await? {
            let mut has_marker = false;
            for label in slider.find_all(&self.site.selectors.year_label).await? {
                if self.year_marker.is_match(&label.text().await?) {
                    has_marker = true;
                    break;
                }
            }
            if has_marker && years.is_none() {
                years = Some(slider);
            } else if !has_marker && releases.is_none() {
                releases = Some(slider);
            }
        }

        match (years, releases) {
            (Some(years), Some(releases)) => Ok((years, releases)),
            (None, _) => Err(Error::NotFound("year slider in story archive".into())),
            (_, None) => Err(Error::NotFound("release slider in story archive".into())),
        }
    }

    async fn collect_links(&self) -> Result<Vec<LinkRecord>> {
        let selectors = &self.site.selectors;
        let archive = self.session.find(&selectors.archive).await?;
        let mut links = Vec::new();

        for tab in &self.site.categories {
            let Some(button) = find_tab(&archive, &selectors.tab_button, &tab.label).await? else {
                if tab.required {
                    return Err(Error::NotFound(format!("category tab {}", tab.label)));
                }
                debug!(category = %tab.label, "Optional category tab absent");
                continue;
            };
            button.click().await?;

            let before = links.len();
            for teaser in archive.find_all(&selectors.teaser).await? {
                let title = teaser.find(&selectors.teaser_title).await?.text().await?;
                let href = teaser
                    .find(&selectors.teaser_link)
                    .await?
                    .attribute("href")
                    .await?
                    .ok_or_else(|| Error::element_not_found(format!("{}[href]", selectors.teaser_link)))?;
                links.push(LinkRecord {
                    category: tab.label.clone(),
                    title,
                    url: absolutize(&self.site.base_url, &href)?,
                });
            }
            info!(category = %tab.label, count = links.len() - before, "Collected article links");
        }

        Ok(links)
    }
}

async fn find_tab<E: Element>(archive: &E, selector: &str, label: &str) -> Result<Option<E>> {
    for button in archive.find_all(selector).await? {
        if button.text().await? == label {
            return Ok(Some(button));
        }
    }
    Ok(None)
}

fn release_matcher(name: &str) -> Result<Regex> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Argument("release name required".into()));
    }
    RegexBuilder::new(&regex::escape(name))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Argument(format!("release matcher: {e}")))
}
