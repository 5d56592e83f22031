//! Browser session contract used by the navigator and the article fetcher.
//!
//! The archive UI is scripted, so pages are driven through a real browser.
//! The session is an explicit handle: whoever holds `&mut` to it owns the
//! browser for the duration of one release, and every call is sequential.
//!
//! - [`BrowserSession`]: page-level navigation and landmark lookup
//! - [`Element`]: a live handle to one element of the current page
//! - [`chrome::ChromeSession`]: the Chromium implementation

pub mod chrome;
#[cfg(test)]
pub mod mock;

use crate::error::Result;

/// A handle to an element of the page currently loaded in the session.
///
/// Lookups use landmark-style CSS selectors. `find` fails with
/// [`crate::error::Error::ElementNotFound`] when nothing matches; `find_all`
/// returns an empty list instead.
pub trait Element: Sized {
    async fn click(&self) -> Result<()>;
    /// Rendered text, whitespace collapsed and trimmed.
    async fn text(&self) -> Result<String>;
    async fn attribute(&self, name: &str) -> Result<Option<String>>;
    async fn inner_html(&self) -> Result<String>;
    async fn find(&self, selector: &str) -> Result<Self>;
    async fn find_all(&self, selector: &str) -> Result<Vec<Self>>;
    async fn scroll_into_view(&self) -> Result<()>;
}

/// An exclusively owned browser session.
pub trait BrowserSession {
    type Element: Element;

    async fn visit(&mut self, url: &str) -> Result<()>;
    async fn find(&self, selector: &str) -> Result<Self::Element>;
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>>;
}

/// Collapse runs of whitespace the way rendered text reads.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
