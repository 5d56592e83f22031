//! Chromium-backed [`BrowserSession`] using chromiumoxide.
//!
//! The browser runs headless unless configured otherwise and a background
//! task drains Chrome DevTools Protocol events. Landmark lookups poll until
//! the element shows up or the configured timeout passes, since the archive
//! UI renders its sliders after page load.

use super::{BrowserSession, Element, collapse_whitespace};
use crate::config::BrowserSettings;
use crate::error::{Error, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy)]
struct Timing {
    timeout: Duration,
    poll: Duration,
    settle: Duration,
}

impl From<&BrowserSettings> for Timing {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            poll: Duration::from_millis(settings.poll_ms.max(1)),
            settle: Duration::from_millis(settings.settle_ms),
        }
    }
}

/// Retry a lookup until it succeeds or the timeout elapses.
async fn wait_for<T, E, F, Fut>(selector: &str, timing: Timing, mut lookup: F) -> Result<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let deadline = Instant::now() + timing.timeout;
    loop {
        match lookup().await {
            Ok(found) => return Ok(found),
            Err(e) if Instant::now() >= deadline => {
                debug!(selector, error = %e, "Landmark lookup timed out");
                return Err(Error::element_not_found(selector));
            }
            Err(_) => sleep(timing.poll).await,
        }
    }
}

fn browser_error(e: impl Display) -> Error {
    Error::Browser(e.to_string())
}

/// A live Chromium session with a single tab.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    timing: Timing,
}

impl ChromeSession {
    /// Launch a browser and open one blank tab.
    #[instrument(level = "info", skip_all, fields(headless = settings.headless))]
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder =
            BrowserConfig::builder().request_timeout(Duration::from_millis(settings.timeout_ms));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(browser_error)?;
        info!("Browser session started");
        Ok(Self {
            browser,
            page,
            handler,
            timing: Timing::from(settings),
        })
    }

    /// Close the browser and wait for the event handler to finish.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.map_err(browser_error)?;
        let _ = self.browser.wait().await;
        let _ = self.handler.await;
        info!("Browser session closed");
        Ok(())
    }
}

impl BrowserSession for ChromeSession {
    type Element = ChromeElement;

    #[instrument(level = "debug", skip(self))]
    async fn visit(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(browser_error)?;
        sleep(self.timing.settle).await;
        Ok(())
    }

    async fn find(&self, selector: &str) -> Result<ChromeElement> {
        let inner = wait_for(selector, self.timing, || self.page.find_element(selector)).await?;
        Ok(ChromeElement {
            inner,
            timing: self.timing,
        })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ChromeElement>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .unwrap_or_default();
        Ok(found
            .into_iter()
            .map(|inner| ChromeElement {
                inner,
                timing: self.timing,
            })
            .collect())
    }
}

/// Element handle within a [`ChromeSession`] page.
pub struct ChromeElement {
    inner: chromiumoxide::element::Element,
    timing: Timing,
}

impl Element for ChromeElement {
    async fn click(&self) -> Result<()> {
        self.inner.click().await.map_err(browser_error)?;
        sleep(self.timing.settle).await;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        let text = self.inner.inner_text().await.map_err(browser_error)?;
        Ok(collapse_whitespace(&text.unwrap_or_default()))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.inner.attribute(name).await.map_err(browser_error)
    }

    async fn inner_html(&self) -> Result<String> {
        let html = self.inner.inner_html().await.map_err(browser_error)?;
        Ok(html.unwrap_or_default())
    }

    async fn find(&self, selector: &str) -> Result<Self> {
        let inner = wait_for(selector, self.timing, || self.inner.find_element(selector)).await?;
        Ok(Self {
            inner,
            timing: self.timing,
        })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        let found = self
            .inner
            .find_elements(selector)
            .await
            .unwrap_or_default();
        Ok(found
            .into_iter()
            .map(|inner| Self {
                inner,
                timing: self.timing,
            })
            .collect())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.inner.scroll_into_view().await.map_err(browser_error)?;
        Ok(())
    }
}
