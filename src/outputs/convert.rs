//! External tool invocations: e-book format conversion and PDF cover
//! rasterisation.
//!
//! Final layout for a book `B` converted to `mobi` and `pdf`:
//!
//! ```text
//! output_dir/
//! ├── epub/B.epub
//! ├── mobi/B.mobi
//! └── pdf/B.pdf
//! ```

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Epub,
    Mobi,
    Azw3,
    Pdf,
    Docx,
    Txt,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Epub,
        OutputFormat::Mobi,
        OutputFormat::Azw3,
        OutputFormat::Pdf,
        OutputFormat::Docx,
        OutputFormat::Txt,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Mobi => "mobi",
            OutputFormat::Azw3 => "azw3",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| {
                Error::Argument(format!(
                    "unsupported format {s:?} (expected one of {})",
                    Self::ALL.map(|f| f.extension()).join(", ")
                ))
            })
    }
}

/// Run a tool to completion; a spawn failure or non-zero exit is a
/// [`Error::Conversion`].
pub async fn run_tool(program: &str, args: &[&OsStr]) -> Result<()> {
    debug!(%program, ?args, "Running external tool");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Conversion(format!("cannot run {program}: {e}")))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::Conversion(format!(
        "{program} exited with {}: {}",
        output.status,
        stderr.trim()
    )))
}

/// Convert `epub` into every other requested format, then move it into
/// `<output_dir>/epub/`. Returns the final paths, epub first.
#[instrument(level = "info", skip_all, fields(book = %epub.display()))]
pub async fn convert_all(
    converter: &str,
    epub: &Path,
    output_dir: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    let stem = epub
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Conversion(format!("no file name in {}", epub.display())))?;
    let mut converted = Vec::new();

    for format in formats.iter().filter(|f| **f != OutputFormat::Epub) {
        let dir = output_dir.join(format.extension());
        fs::create_dir_all(&dir).await?;
        let target = dir.join(format!("{stem}.{format}"));

        info!(%format, target = %target.display(), "Converting book");
        run_tool(converter, &[epub.as_os_str(), target.as_os_str()]).await?;
        converted.push(target);
    }

    let epub_dir = output_dir.join(OutputFormat::Epub.extension());
    fs::create_dir_all(&epub_dir).await?;
    let final_epub = epub_dir.join(format!("{stem}.{}", OutputFormat::Epub));
    if final_epub != epub {
        fs::rename(epub, &final_epub).await?;
    }
    info!(path = %final_epub.display(), conversions = converted.len(), "Book in place");

    converted.insert(0, final_epub);
    Ok(converted)
}

/// Render the first page of a PDF to PNG bytes.
#[instrument(level = "info", skip(pdf))]
pub async fn rasterize_pdf(rasterizer: &str, pdf: &[u8]) -> Result<Vec<u8>> {
    let workdir = tempfile::tempdir()?;
    let input = workdir.path().join("cover.pdf");
    let prefix = workdir.path().join("cover");
    fs::write(&input, pdf).await?;

    run_tool(
        rasterizer,
        &[
            OsStr::new("-png"),
            OsStr::new("-singlefile"),
            OsStr::new("-r"),
            OsStr::new("150"),
            input.as_os_str(),
            prefix.as_os_str(),
        ],
    )
    .await?;

    let png = fs::read(prefix.with_extension("png")).await?;
    info!(bytes = png.len(), "Rasterised PDF cover");
    Ok(png)
}
