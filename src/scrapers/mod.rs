//! Story archive scrapers.
//!
//! Scraping follows the same two-phase pattern for every release:
//!
//! 1. **Indexing** ([`navigator`]): open the story archive, page through the
//!    year slider until the release shows up, activate it and collect one
//!    [`crate::models::LinkRecord`] per teaser under each category tab.
//! 2. **Fetching** ([`article`]): load each linked page, read its header
//!    landmarks and sanitize its body into a
//!    [`crate::models::ArticleRecord`].
//!
//! Both phases drive the same [`crate::session::BrowserSession`] one call at
//! a time. Landmark failures surface as errors and are never retried: they
//! mean the site layout changed.

pub mod article;
pub mod navigator;
