//! Error taxonomy for the story compiler.
//!
//! Errors fall into two groups. Startup errors ([`Error::Argument`],
//! [`Error::Config`]) stop the program before any browser or network
//! activity. Everything else belongs to a single release: the batch driver
//! records it against that release and moves on to the next one.
//!
//! A HEAD probe answering "not found" is not represented here. The retry
//! policy in [`crate::api`] absorbs it, and an exhausted probe simply reports
//! its final status so the resolver can try the next candidate URL.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A release, tab or listing could not be located in the archive UI.
    #[error("not found: {0}")]
    NotFound(String),

    /// A landmark element required on a page was absent.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// The card catalog lookup for a release failed.
    #[error("metadata unavailable for release {code}: {reason}")]
    MetadataUnavailable { code: String, reason: String },

    /// No artwork candidate answered for the release.
    #[error("no release artwork found for {code}")]
    ReleaseArtworkNotFound { code: String },

    /// Invalid or contradictory command-line options.
    #[error("invalid arguments: {0}")]
    Argument(String),

    /// Invalid settings file contents.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The browser driver reported a failure.
    #[error("browser error: {0}")]
    Browser(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The e-book container could not be assembled.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// An external conversion tool failed.
    #[error("conversion failed: {0}")]
    Conversion(String),
}

impl Error {
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Error::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// Whether this error should abort the whole run rather than one release.
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Error::Argument(_) | Error::Config(_))
    }
}
