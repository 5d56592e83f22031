//! Book packaging and conversion.
//!
//! # Submodules
//!
//! - [`epub`]: plans chapters from articles and writes the EPUB container
//! - [`cover`]: fetches or reads the cover and rasterises PDF artwork
//! - [`convert`]: runs the external converter and lays out per-format dirs
//! - [`json`]: writes the article manifest
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── .digests/<code>/content.sha256
//! ├── epub/
//! │   ├── Magic: The Gathering - <name>.epub
//! │   └── <code>.articles.json
//! └── <format>/Magic: The Gathering - <name>.<format>
//! ```

pub mod convert;
pub mod cover;
pub mod epub;
pub mod json;
