//! Cover image acquisition.

use crate::api::HttpClient;
use crate::error::{Error, Result};
use crate::models::ReleaseMetadata;
use crate::outputs::convert::rasterize_pdf;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Cover bytes ready to embed in the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Image type sniffed from magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some(("png", "image/png")),
        [0xFF, 0xD8, 0xFF, ..] => Some(("jpg", "image/jpeg")),
        [b'G', b'I', b'F', b'8', ..] => Some(("gif", "image/gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some(("webp", "image/webp"))
        }
        _ => None,
    }
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Load the release cover from a URL or a local path.
///
/// PDF assets are rasterised to PNG with `rasterizer`.
#[instrument(level = "info", skip_all, fields(source = %meta.image_url))]
pub async fn load_cover<C: HttpClient>(
    client: &C,
    meta: &ReleaseMetadata,
    rasterizer: &str,
) -> Result<Cover> {
    let bytes = match meta.local_image_path() {
        Some(path) => read_local(path).await?,
        None => {
            let response = client.get(&meta.image_url).await?;
            if !response.is_success() {
                return Err(Error::Packaging(format!(
                    "cover download answered {}",
                    response.status
                )));
            }
            response.body
        }
    };

    let bytes = if is_pdf(&bytes) {
        rasterize_pdf(rasterizer, &bytes).await?
    } else {
        bytes
    };

    let (extension, mime) = sniff_image(&bytes)
        .ok_or_else(|| Error::Packaging("cover is not a recognised image".into()))?;
    info!(mime, bytes = bytes.len(), "Loaded cover");
    Ok(Cover {
        file_name: format!("cover.{extension}"),
        mime,
        bytes,
    })
}

async fn read_local(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .await
        .map_err(|e| Error::Packaging(format!("cover {}: {e}", path.display())))
}
