//! In-memory [`BrowserSession`] for tests.
//!
//! Pages and UI states are plain HTML documents keyed by name. `visit`
//! switches to the document registered under the URL; clicking an element
//! carrying `data-goto="<key>"` switches to that document, which is how
//! slider and tab activation are simulated.
//!
//! Element handles are locator chains re-resolved against the current
//! document on every call, so a handle found before a click sees the state
//! after it, like a live DOM node.

use super::{BrowserSession, Element, collapse_whitespace};
use crate::error::{Error, Result};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    documents: HashMap<String, String>,
    current: Option<String>,
    visits: Vec<String>,
    clicks: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a URL or state key.
    pub fn with_document(self, key: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(key.to_string(), html.to_string());
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().unwrap().visits.clone()
    }

    /// `data-goto` targets of every click, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    fn root(&self) -> MockElement {
        MockElement {
            state: Arc::clone(&self.state),
            path: Vec::new(),
        }
    }
}

impl BrowserSession for MockSession {
    type Element = MockElement;

    async fn visit(&mut self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.documents.contains_key(url) {
            return Err(Error::Browser(format!("no mock page for {url}")));
        }
        state.current = Some(url.to_string());
        state.visits.push(url.to_string());
        Ok(())
    }

    async fn find(&self, selector: &str) -> Result<MockElement> {
        self.root().find(selector).await
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<MockElement>> {
        self.root().find_all(selector).await
    }
}

#[derive(Clone)]
pub struct MockElement {
    state: Arc<Mutex<MockState>>,
    path: Vec<(String, usize)>,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::Browser(format!("bad selector {selector}: {e:?}")))
}

impl MockElement {
    fn resolve<R>(&self, f: impl FnOnce(ElementRef<'_>) -> Result<R>) -> Result<R> {
        let html = {
            let state = self.state.lock().unwrap();
            let key = state
                .current
                .clone()
                .ok_or_else(|| Error::Browser("no page loaded".into()))?;
            state.documents[&key].clone()
        };
        let document = Html::parse_document(&html);
        let mut element = document.root_element();
        for (selector, index) in &self.path {
            let parsed = parse_selector(selector)?;
            element = element
                .select(&parsed)
                .nth(*index)
                .ok_or_else(|| Error::element_not_found(selector.as_str()))?;
        }
        f(element)
    }

    fn child(&self, selector: &str, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push((selector.to_string(), index));
        Self {
            state: Arc::clone(&self.state),
            path,
        }
    }

    fn count(&self, selector: &str) -> Result<usize> {
        let parsed = parse_selector(selector)?;
        self.resolve(|el| Ok(el.select(&parsed).count()))
    }
}

impl Element for MockElement {
    async fn click(&self) -> Result<()> {
        let target = self.resolve(|el| Ok(el.value().attr("data-goto").map(str::to_string)))?;
        let mut state = self.state.lock().unwrap();
        if let Some(target) = target {
            if !state.documents.contains_key(&target) {
                return Err(Error::Browser(format!("no mock state {target}")));
            }
            state.clicks.push(target.clone());
            state.current = Some(target);
        }
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        self.resolve(|el| Ok(collapse_whitespace(&el.text().collect::<String>())))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.resolve(|el| Ok(el.value().attr(name).map(str::to_string)))
    }

    async fn inner_html(&self) -> Result<String> {
        self.resolve(|el| Ok(el.inner_html()))
    }

    async fn find(&self, selector: &str) -> Result<Self> {
        if self.count(selector)? == 0 {
            return Err(Error::element_not_found(selector));
        }
        Ok(self.child(selector, 0))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        let count = self.count(selector)?;
        Ok((0..count).map(|i| self.child(selector, i)).collect())
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.resolve(|_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <ul id="list"><li data-goto="second">one</li><li>two</li></ul>
    </body></html>"#;
    const SECOND: &str = r#"<html><body><ul id="list"><li>three</li></ul></body></html>"#;

    #[tokio::test]
    async fn test_handles_follow_state_changes() {
        let mut session = MockSession::new()
            .with_document("https://example.com", PAGE)
            .with_document("second", SECOND);
        session.visit("https://example.com").await.unwrap();

        let list = session.find("ul#list").await.unwrap();
        let items = list.find_all("li").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text().await.unwrap(), "two");

        items[0].click().await.unwrap();
        assert_eq!(list.find_all("li").await.unwrap().len(), 1);
        assert_eq!(list.find("li").await.unwrap().text().await.unwrap(), "three");
        assert_eq!(session.clicks(), vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_element_and_page() {
        let mut session = MockSession::new().with_document("https://example.com", PAGE);
        assert!(session.visit("https://nowhere.example").await.is_err());
        session.visit("https://example.com").await.unwrap();
        assert!(matches!(
            session.find("table").await,
            Err(Error::ElementNotFound { .. })
        ));
        assert!(session.find_all("table").await.unwrap().is_empty());
    }
}
