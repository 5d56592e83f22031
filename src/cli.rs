//! Command-line interface definitions for the story compiler.
//!
//! Flags are parsed with `clap`; cross-flag rules are checked by
//! [`Cli::validate`] before any browser or network activity.

use crate::error::{Error, Result};
use crate::models::ReleaseDescriptor;
use crate::outputs::convert::OutputFormat;
use clap::Parser;
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # One release, epub only
/// story_compiler -r mkm -o ./books
///
/// # Override the cover and convert to two more formats
/// story_compiler -r mkm -i https://example.com/cover.png -F epub,mobi,pdf
///
/// # A batch of releases
/// story_compiler -f releases.yaml -o ./books
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Release code to build, e.g. `mkm`
    #[arg(short, long)]
    pub release: Option<String>,

    /// Display name override for --release
    #[arg(short, long)]
    pub name: Option<String>,

    /// Cover image URL or path override for --release
    #[arg(short = 'i', long)]
    pub cover_url: Option<String>,

    /// Batch file: a YAML list of `{code, name?, cover_url?}` or one code per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory receiving books, conversions and digests
    #[arg(short, long, default_value = "./")]
    pub output_dir: PathBuf,

    /// Comma-separated output formats (epub, mobi, azw3, pdf, docx, txt)
    #[arg(short = 'F', long, default_value = "epub")]
    pub formats: String,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "STORY_COMPILER_CONFIG")]
    pub config: Option<String>,

    /// Rebuild even when the content digest is unchanged
    #[arg(long)]
    pub force: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

impl Cli {
    /// Reject contradictory or unusable flag combinations.
    pub fn validate(&self) -> Result<()> {
        match (&self.release, &self.file) {
            (Some(_), Some(_)) => {
                return Err(Error::Argument(
                    "--release and --file are mutually exclusive".into(),
                ));
            }
            (None, None) => {
                return Err(Error::Argument("one of --release or --file is required".into()));
            }
            (None, Some(_)) if self.name.is_some() || self.cover_url.is_some() => {
                return Err(Error::Argument(
                    "--name and --cover-url only apply to --release".into(),
                ));
            }
            _ => {}
        }
        if self.release.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(Error::Argument("--release must not be empty".into()));
        }
        self.output_formats()?;
        Ok(())
    }

    /// Requested formats, deduplicated in order.
    pub fn output_formats(&self) -> Result<Vec<OutputFormat>> {
        let formats: Vec<OutputFormat> = self
            .formats
            .split(',')
            .filter(|f| !f.trim().is_empty())
            .map(str::parse::<OutputFormat>)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unique()
            .collect();
        if formats.is_empty() {
            return Err(Error::Argument("--formats must name at least one format".into()));
        }
        Ok(formats)
    }

    /// Releases to build, from --release or the batch file.
    pub fn releases(&self) -> Result<Vec<ReleaseDescriptor>> {
        if let Some(code) = &self.release {
            return Ok(vec![ReleaseDescriptor {
                code: code.trim().to_string(),
                name: self.name.clone(),
                cover_url: self.cover_url.clone(),
            }]);
        }
        match &self.file {
            Some(path) => load_batch(path),
            None => Err(Error::Argument("one of --release or --file is required".into())),
        }
    }
}

/// Read a batch file.
///
/// A YAML sequence of descriptors (or of bare codes) is tried first; any
/// other content is read as one release code per line, `#` starting a
/// comment.
pub fn load_batch(path: &Path) -> Result<Vec<ReleaseDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Argument(format!("cannot read {}: {e}", path.display())))?;
    let releases = parse_batch(&raw);
    if releases.is_empty() {
        return Err(Error::Argument(format!("{} lists no releases", path.display())));
    }
    info!(path = %path.display(), count = releases.len(), "Loaded batch file");
    Ok(releases)
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum BatchEntry {
    Code(String),
    Descriptor(ReleaseDescriptor),
}

fn parse_batch(raw: &str) -> Vec<ReleaseDescriptor> {
    if let Ok(entries) = serde_yaml::from_str::<Vec<BatchEntry>>(raw) {
        return entries
            .into_iter()
            .map(|entry| match entry {
                BatchEntry::Code(code) => ReleaseDescriptor::new(code.trim()),
                BatchEntry::Descriptor(d) => d,
            })
            .filter(|d| !d.code.trim().is_empty())
            .collect();
    }
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(ReleaseDescriptor::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("story_compiler").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_parsing() {
        let cli = parse(&["--release", "mkm", "--output-dir", "./books", "--formats", "epub,mobi"]);
        cli.validate().unwrap();
        assert_eq!(cli.output_dir, PathBuf::from("./books"));
        assert_eq!(
            cli.output_formats().unwrap(),
            vec![OutputFormat::Epub, OutputFormat::Mobi]
        );
        assert_eq!(cli.releases().unwrap(), vec![ReleaseDescriptor::new("mkm")]);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = parse(&["-r", "mkm", "-n", "Karlov", "-i", "/tmp/c.png", "-F", "pdf", "--force"]);
        cli.validate().unwrap();
        assert!(cli.force);
        assert_eq!(cli.output_dir, PathBuf::from("./"));
        let release = &cli.releases().unwrap()[0];
        assert_eq!(release.name.as_deref(), Some("Karlov"));
        assert_eq!(release.cover_url.as_deref(), Some("/tmp/c.png"));
    }

    #[test]
    fn test_validation_errors() {
        let argument_error = |args: &[&str]| matches!(parse(args).validate(), Err(Error::Argument(_)));
        assert!(argument_error(&[]));
        assert!(argument_error(&["-r", "mkm", "-f", "batch.yaml"]));
        assert!(argument_error(&["-f", "batch.yaml", "-n", "Name"]));
        assert!(argument_error(&["-r", "mkm", "-F", "epub,html"]));
        assert!(argument_error(&["-r", "mkm", "-F", " , "]));
        assert!(argument_error(&["-r", "  "]));
    }

    #[test]
    fn test_parse_yaml_batch() {
        let raw = "- code: mkm\n  name: Murders at Karlov Manor\n- otj\n- code: lci\n  cover_url: https://example.com/lci.png\n";
        let releases = parse_batch(raw);
        assert_eq!(releases.len(), 3);
        assert_eq!(releases[0].name.as_deref(), Some("Murders at Karlov Manor"));
        assert_eq!(releases[1], ReleaseDescriptor::new("otj"));
        assert_eq!(releases[2].cover_url.as_deref(), Some("https://example.com/lci.png"));
    }

    #[test]
    fn test_parse_plain_batch() {
        let releases = parse_batch("mkm\n\n# skipped\notj  # trailing\n");
        assert_eq!(
            releases,
            vec![ReleaseDescriptor::new("mkm"), ReleaseDescriptor::new("otj")]
        );
    }

    #[test]
    fn test_load_batch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("releases.txt");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(load_batch(&path), Err(Error::Argument(_))));
        std::fs::write(&path, "- mkm\n").unwrap();
        assert_eq!(load_batch(&path).unwrap(), vec![ReleaseDescriptor::new("mkm")]);
    }
}
