//! Article page fetching.
//!
//! An article page carries a `header` with the publish `time` and author
//! links, and a `div.article-body` with the story itself. The body markup is
//! passed through [`crate::sanitize::rewrite_upstream_quirks`] and then
//! [`crate::sanitize::sanitize`].

use crate::config::SiteConfig;
use crate::error::Result;
use crate::models::{ArticleRecord, LinkRecord};
use crate::sanitize::{rewrite_upstream_quirks, sanitize};
use crate::session::{BrowserSession, Element};
use crate::utils::truncate_for_log;
use tracing::{debug, info, instrument};

/// Load one linked article and turn it into an [`ArticleRecord`].
///
/// # Errors
///
/// [`crate::error::Error::ElementNotFound`] when the article, header, body
/// or time landmark is missing. A missing author is not an error.
#[instrument(level = "info", skip_all, fields(url = %link.url, category = %link.category))]
pub async fn fetch_article<S: BrowserSession>(
    session: &mut S,
    link: &LinkRecord,
    site: &SiteConfig,
) -> Result<ArticleRecord> {
    let selectors = &site.selectors;
    session.visit(&link.url).await?;

    let main = session.find(&selectors.article).await?;
    let header = main.find(&selectors.article_header).await?;
    let body = main.find(&selectors.article_body).await?;
    let publish_date = header.find(&selectors.publish_time).await?.text().await?;

    let mut author = String::new();
    for anchor in header.find_all(&selectors.author_link).await? {
        let text = anchor.text().await?;
        if !text.is_empty() && text != site.byline {
            author = text;
            break;
        }
    }

    let raw = body.inner_html().await?;
    debug!(raw = %truncate_for_log(&raw, 200), "Fetched article body");
    let text = sanitize(&rewrite_upstream_quirks(&raw));

    let title = derive_title(&link.title, &link.category, &site.default_category);
    info!(%title, %author, %publish_date, bytes = text.len(), "Fetched article");

    Ok(ArticleRecord {
        title,
        category: link.category.clone(),
        url: link.url.clone(),
        author,
        publish_date,
        text,
    })
}

/// Book title for an article.
///
/// Keeps the last `|`-separated segment of the listing title and prefixes it
/// with `"<Category>: "` unless the category is the default one.
pub fn derive_title(raw_title: &str, category: &str, default_category: &str) -> String {
    let base = raw_title.rsplit('|').next().unwrap_or(raw_title).trim();
    if category == default_category {
        base.to_string()
    } else {
        format!("{category}: {base}")
    }
}
