//! Settings file for site landmarks, asset URL templates and timeouts.
//!
//! Every field has a default matching the live story archive, so the file is
//! optional. When given (`--config` or `STORY_COMPILER_CONFIG`) it is read as
//! YAML and any subset of fields may be overridden:
//!
//! ```yaml
//! site:
//!   categories:
//!     - { label: "Magic Story", required: true }
//!     - { label: "Side Stories", required: false }
//! retry:
//!   max_attempts: 3
//! browser:
//!   headless: false
//! ```

use crate::api::RetryPolicy;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// Placeholders understood by artwork URL templates.
pub const YEAR_PLACEHOLDER: &str = "{year}";
pub const PATH_CODE_PLACEHOLDER: &str = "{path_code}";
pub const FILE_CODE_PLACEHOLDER: &str = "{file_code}";
/// Placeholder understood by the catalog URL template.
pub const CODE_PLACEHOLDER: &str = "{code}";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub catalog: CatalogConfig,
    pub artwork: ArtworkConfig,
    pub retry: RetrySettings,
    pub http: HttpSettings,
    pub browser: BrowserSettings,
    pub tools: ToolSettings,
    /// Directory, relative to the output directory, holding stored digests.
    pub digest_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Page hosting the story archive sliders.
    pub archive_url: String,
    /// Base for resolving relative article links.
    pub base_url: String,
    pub selectors: Selectors,
    /// Tabs activated in order on a release listing.
    pub categories: Vec<CategoryTab>,
    /// Category whose articles get no title prefix.
    pub default_category: String,
    /// Header link text that is the site byline rather than an author.
    pub byline: String,
    /// Pattern recognising a year label; the slider showing one holds years.
    pub year_marker: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            archive_url: "https://magic.wizards.com/en/story".to_string(),
            base_url: "https://magic.wizards.com".to_string(),
            selectors: Selectors::default(),
            categories: vec![
                CategoryTab::required("Magic Story"),
                CategoryTab::optional("Side Stories"),
                CategoryTab::optional("Seasonal Stories"),
            ],
            default_category: "Magic Story".to_string(),
            byline: "Magic Story".to_string(),
            year_marker: r"^\s*(19|20)\d{2}\s*$".to_string(),
        }
    }
}

/// Landmark selectors for the archive listing and article pages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Selectors {
    pub archive: String,
    pub slider: String,
    pub year_item: String,
    pub year_label: String,
    pub release_item: String,
    pub tab_button: String,
    pub teaser: String,
    pub teaser_title: String,
    pub teaser_link: String,
    pub article: String,
    pub article_header: String,
    pub article_body: String,
    pub publish_time: String,
    pub author_link: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            archive: "section#story-archive".to_string(),
            slider: "section#story-archive div.swiper-wrapper".to_string(),
            year_item: "span.swiper-slide".to_string(),
            year_label: "span".to_string(),
            release_item: "div.swiper-slide".to_string(),
            tab_button: "button".to_string(),
            teaser: "article".to_string(),
            teaser_title: "h3".to_string(),
            teaser_link: r#"a[aria-label="Read More"]"#.to_string(),
            article: "article".to_string(),
            article_header: "header".to_string(),
            article_body: "div.article-body".to_string(),
            publish_time: "time".to_string(),
            author_link: "a".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryTab {
    pub label: String,
    /// A required tab missing from a listing is a `NotFound` error.
    #[serde(default)]
    pub required: bool,
}

impl CategoryTab {
    pub fn required(label: &str) -> Self {
        Self {
            label: label.to_string(),
            required: true,
        }
    }

    pub fn optional(label: &str) -> Self {
        Self {
            label: label.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Card catalog set endpoint; `{code}` is replaced by the release code.
    pub url_template: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url_template: "https://api.scryfall.com/sets/{code}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtworkConfig {
    /// High resolution key art, probed first.
    pub pdf_templates: Vec<String>,
    /// Wallpaper bundles, probed when no PDF answers.
    pub zip_templates: Vec<String>,
    /// Oldest year probed.
    pub first_year: i32,
    /// Substring identifying the wanted entry inside a wallpaper bundle.
    pub resolution_marker: String,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            pdf_templates: vec![
                "https://media.wizards.com/{year}/{path_code}/marketing/{file_code}_keyart_hires.pdf"
                    .to_string(),
            ],
            zip_templates: vec![
                "https://media.wizards.com/{year}/{path_code}/marketing/{file_code}_wallpapers.zip"
                    .to_string(),
                "https://media.wizards.com/{year}/downloads/{path_code}/{file_code}_wallpapers.zip"
                    .to_string(),
            ],
            first_year: 2017,
            resolution_marker: "1080x1350".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_interval_ms: u64,
    pub jitter_fraction: f64,
    pub backoff_multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_interval_ms: 500,
            jitter_fraction: 0.5,
            backoff_multiplier: 2.0,
            retryable_statuses: vec![404],
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_interval: Duration::from_millis(self.base_interval_ms),
            jitter_fraction: self.jitter_fraction,
            backoff_multiplier: self.backoff_multiplier,
            retryable_statuses: self.retryable_statuses.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("story_compiler/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Upper bound for waiting on a landmark to appear.
    pub timeout_ms: u64,
    /// Pause after navigation and clicks so the archive UI can settle.
    pub settle_ms: u64,
    pub poll_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 20_000,
            settle_ms: 750,
            poll_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolSettings {
    pub converter: String,
    pub rasterizer: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            converter: "ebook-convert".to_string(),
            rasterizer: "pdftoppm".to_string(),
        }
    }
}

impl Config {
    /// Load settings from an optional YAML file and validate them.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("cannot read {path}: {e}")))?;
                let config: Config = serde_yaml::from_str(&raw)?;
                info!(path, "Loaded settings file");
                config
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.categories.is_empty() {
            return Err(Error::Config("site.categories must not be empty".into()));
        }
        Regex::new(&self.site.year_marker)
            .map_err(|e| Error::Config(format!("site.year_marker: {e}")))?;
        if !self.catalog.url_template.contains(CODE_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "catalog.url_template must contain {CODE_PLACEHOLDER}"
            )));
        }
        for template in self
            .artwork
            .pdf_templates
            .iter()
            .chain(&self.artwork.zip_templates)
        {
            if !template.contains(YEAR_PLACEHOLDER) {
                return Err(Error::Config(format!(
                    "artwork template {template} must contain {YEAR_PLACEHOLDER}"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(Error::Config("retry.jitter_fraction must be within 0..=1".into()));
        }
        if self.digest_dir.is_empty() {
            return Err(Error::Config("digest_dir must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            catalog: CatalogConfig::default(),
            artwork: ArtworkConfig::default(),
            retry: RetrySettings::default(),
            http: HttpSettings::default(),
            browser: BrowserSettings::default(),
            tools: ToolSettings::default(),
            digest_dir: ".digests".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.site.categories[0], CategoryTab::required("Magic Story"));
        assert_eq!(config.artwork.first_year, 2017);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "retry:\n  max_attempts: 2\nbrowser:\n  headless: false\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.retryable_statuses, vec![404]);
        assert!(!config.browser.headless);
        assert_eq!(config.site.default_category, "Magic Story");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_template_without_year() {
        let mut config = Config::default();
        config.artwork.zip_templates = vec!["https://example.com/{file_code}.zip".into()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_year_marker() {
        let mut config = Config::default();
        config.site.year_marker = "([".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_interval, Duration::from_millis(500));
        assert!(policy.is_retryable(404));
        assert!(!policy.is_retryable(500));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "tools:\n  converter: /opt/calibre/ebook-convert\n").unwrap();
        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.tools.converter, "/opt/calibre/ebook-convert");
        assert_eq!(config.tools.rasterizer, "pdftoppm");
    }
}
