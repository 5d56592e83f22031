//! EPUB packaging.
//!
//! A [`Book`] is planned from the fetched articles: one XHTML chapter per
//! article plus a generated title page. Image references in article bodies
//! are rewritten to `../image/<name>` and the images are fetched and stored
//! once per name. Container writing is delegated to `epub-builder`.
//!
//! ```text
//! OEBPS/
//! ├── title.xhtml
//! ├── text/01_<slug>.xhtml
//! ├── image/<name>
//! └── image/cover.<ext>
//! ```

use crate::api::HttpClient;
use crate::error::{Error, Result};
use crate::models::ArticleRecord;
use crate::outputs::cover::{Cover, sniff_image};
use crate::utils::{absolutize, slugify_title, url_basename};
use chrono::{DateTime, NaiveDate};
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use itertools::Itertools;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const IMAGE_DIR: &str = "image";

const TITLE_PREFIX: &str = "Magic: The Gathering - ";

static VOID_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(br|hr|img)\b([^>]*?)\s*/?>").unwrap());

fn packaging(e: impl Display) -> Error {
    Error::Packaging(e.to_string())
}

/// An image referenced by a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Absolute source URL.
    pub url: String,
    /// Name under [`IMAGE_DIR`].
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Path inside the container, e.g. `text/01_alley_cats.xhtml`.
    pub href: String,
    pub title: String,
    pub xhtml: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub title: String,
    /// Unique non-empty authors in first-seen order.
    pub creators: Vec<String>,
    /// Earliest and latest parseable publish dates.
    pub published: Option<(NaiveDate, NaiveDate)>,
    pub chapters: Vec<Chapter>,
    /// Unique by file name, in first-seen order.
    pub images: Vec<ImageRef>,
}

/// `"Magic: The Gathering - <name>"`.
pub fn book_title(release_name: &str) -> String {
    format!("{TITLE_PREFIX}{release_name}")
}

/// Parse the free-form publish date shown on article pages.
pub fn parse_publish_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|d| d.date_naive()))
}

/// Turn sanitized HTML into well-formed XHTML content.
fn to_xhtml(html: &str) -> String {
    VOID_ELEMENT
        .replace_all(html, "<$1$2 />")
        .replace("&nbsp;", "&#160;")
}

fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Point every `<img src>` at [`IMAGE_DIR`] and report the originals.
///
/// Images whose source cannot be resolved are dropped.
pub fn rewrite_images(html: &str, page_url: &str) -> Result<(String, Vec<ImageRef>)> {
    let mut found = Vec::new();
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("img", |el| {
                let resolved = el
                    .get_attribute("src")
                    .and_then(|src| absolutize(page_url, &src).ok())
                    .and_then(|url| url_basename(&url).map(|name| (url, safe_file_name(&name))));
                match resolved {
                    Some((url, file_name)) => {
                        el.set_attribute("src", &format!("../{IMAGE_DIR}/{file_name}"))?;
                        found.push(ImageRef { url, file_name });
                    }
                    None => el.remove(),
                }
                Ok(())
            })],
            ..Default::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter.write(html.as_bytes()).map_err(packaging)?;
    rewriter.end().map_err(packaging)?;
    Ok((String::from_utf8_lossy(&output).into_owned(), found))
}

fn chapter_document(title: &str, body: &str) -> String {
    let title = escape(title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#
    )
}

impl Book {
    /// Lay out chapters and collect images and metadata.
    pub fn plan(release_name: &str, articles: &[ArticleRecord]) -> Result<Self> {
        let mut chapters = Vec::with_capacity(articles.len());
        let mut images: Vec<ImageRef> = Vec::new();

        for (i, article) in articles.iter().enumerate() {
            let (body, refs) = rewrite_images(&article.text, &article.url)?;
            images.extend(refs);
            chapters.push(Chapter {
                href: format!("text/{:02}_{}.xhtml", i + 1, slugify_title(&article.title)),
                title: article.title.clone(),
                xhtml: chapter_document(&article.title, &to_xhtml(&body)),
            });
        }

        let dates = articles
            .iter()
            .filter_map(|a| parse_publish_date(&a.publish_date))
            .minmax()
            .into_option();

        Ok(Self {
            title: book_title(release_name),
            creators: articles
                .iter()
                .map(|a| a.author.trim())
                .filter(|a| !a.is_empty())
                .unique()
                .map(str::to_string)
                .collect(),
            published: dates,
            chapters,
            images: images
                .into_iter()
                .unique_by(|img| img.file_name.clone())
                .collect(),
        })
    }

    /// File name of the container, `"<title>.epub"`.
    pub fn file_name(&self) -> String {
        format!("{}.epub", self.title.replace(['/', '\\'], "-"))
    }

    pub fn title_page(&self) -> String {
        let mut body = String::new();
        if !self.creators.is_empty() {
            body.push_str(&format!("<p>By {}</p>\n", escape(&self.creators.join(", "))));
        }
        if let Some((first, last)) = self.published {
            let fmt = |d: NaiveDate| d.format("%B %-d, %Y").to_string();
            let range = if first == last {
                fmt(first)
            } else {
                format!("{} to {}", fmt(first), fmt(last))
            };
            body.push_str(&format!("<p>Published {range}</p>\n"));
        }
        chapter_document(&self.title, &body)
    }
}

/// Download every planned image. Failures are logged and skipped.
#[instrument(level = "info", skip_all, fields(count = book.images.len()))]
pub async fn fetch_images<C: HttpClient>(
    client: &C,
    book: &Book,
) -> Vec<(ImageRef, Vec<u8>)> {
    let mut fetched = Vec::with_capacity(book.images.len());
    for image in &book.images {
        match client.get(&image.url).await {
            Ok(response) if response.is_success() => {
                debug!(url = %image.url, bytes = response.body.len(), "Fetched image");
                fetched.push((image.clone(), response.body));
            }
            Ok(response) => warn!(url = %image.url, status = response.status, "Image unavailable"),
            Err(e) => warn!(url = %image.url, error = %e, "Image download failed"),
        }
    }
    fetched
}

fn image_mime(image: &ImageRef, bytes: &[u8]) -> &'static str {
    if let Some((_, mime)) = sniff_image(bytes) {
        return mime;
    }
    match Path::new(&image.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "image/jpeg",
    }
}

/// Write the container to `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), chapters = book.chapters.len()))]
pub fn write_epub(
    book: &Book,
    images: &[(ImageRef, Vec<u8>)],
    cover: Option<&Cover>,
    path: &Path,
) -> Result<()> {
    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(packaging)?).map_err(packaging)?;
    builder.epub_version(EpubVersion::V30);
    builder.metadata("title", book.title.as_str()).map_err(packaging)?;
    builder.metadata("lang", "en").map_err(packaging)?;
    builder
        .metadata("generator", env!("CARGO_PKG_NAME"))
        .map_err(packaging)?;
    for creator in &book.creators {
        builder.metadata("author", creator.as_str()).map_err(packaging)?;
    }

    match cover {
        Some(cover) => {
            builder
                .add_cover_image(
                    format!("{IMAGE_DIR}/{}", cover.file_name),
                    cover.bytes.as_slice(),
                    cover.mime,
                )
                .map_err(packaging)?;
        }
        None => warn!("Packaging without a cover"),
    }

    for (image, bytes) in images {
        builder
            .add_resource(
                format!("{IMAGE_DIR}/{}", image.file_name),
                bytes.as_slice(),
                image_mime(image, bytes),
            )
            .map_err(packaging)?;
    }

    let title_page = book.title_page();
    builder
        .add_content(
            EpubContent::new("title.xhtml", title_page.as_bytes())
                .title(book.title.as_str())
                .reftype(ReferenceType::TitlePage),
        )
        .map_err(packaging)?;
    for chapter in &book.chapters {
        builder
            .add_content(
                EpubContent::new(chapter.href.as_str(), chapter.xhtml.as_bytes())
                    .title(chapter.title.as_str())
                    .reftype(ReferenceType::Text),
            )
            .map_err(packaging)?;
    }
    builder.inline_toc();

    let mut file = std::fs::File::create(path)?;
    builder.generate(&mut file).map_err(packaging)?;
    info!(images = images.len(), "Wrote EPUB");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedClient;
    use std::io::Read;

    fn article(title: &str, author: &str, date: &str, text: &str) -> ArticleRecord {
        ArticleRecord {
            title: title.into(),
            category: "Magic Story".into(),
            url: "https://magic.wizards.com/en/news/mkm/episode-1".into(),
            author: author.into(),
            publish_date: date.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_parse_publish_date() {
        let jan16 = NaiveDate::from_ymd_opt(2024, 1, 16);
        assert_eq!(parse_publish_date("January 16, 2024"), jan16);
        assert_eq!(parse_publish_date(" Jan 16, 2024 "), jan16);
        assert_eq!(parse_publish_date("2024-01-16"), jan16);
        assert_eq!(parse_publish_date("2024-01-16T09:00:00Z"), jan16);
        assert_eq!(parse_publish_date("sometime"), None);
    }

    #[test]
    fn test_rewrite_images() {
        let (html, refs) = rewrite_images(
            r#"<p><img src="/images/Art%20One.jpg" alt="a"><img alt="no source"></p>"#,
            "https://magic.wizards.com/en/news/mkm/episode-1",
        )
        .unwrap();
        assert_eq!(html, r#"<p><img src="../image/Art_One.jpg" alt="a"></p>"#);
        assert_eq!(
            refs,
            vec![ImageRef {
                url: "https://magic.wizards.com/images/Art%20One.jpg".into(),
                file_name: "Art_One.jpg".into(),
            }]
        );
    }

    #[test]
    fn test_to_xhtml_closes_void_elements() {
        assert_eq!(
            to_xhtml(r#"<p>a<br>b&nbsp;c</p><hr><img src="x.png" />"#),
            r#"<p>a<br />b&#160;c</p><hr /><img src="x.png" />"#
        );
    }

    #[test]
    fn test_plan_collects_metadata() {
        let articles = vec![
            article("Episode 1", "Seanan McGuire", "February 6, 2024", r#"<p><img src="/a.jpg"></p>"#),
            article("Side Stories: <Cats>", "", "January 16, 2024", r#"<p><img src="/b/a.jpg"></p>"#),
            article("Episode 2", "Seanan McGuire", "not a date", "<p>Two</p>"),
        ];
        let book = Book::plan("Murders at Karlov Manor", &articles).unwrap();

        assert_eq!(book.title, "Magic: The Gathering - Murders at Karlov Manor");
        assert_eq!(book.file_name(), "Magic: The Gathering - Murders at Karlov Manor.epub");
        assert_eq!(book.creators, vec!["Seanan McGuire"]);
        assert_eq!(
            book.published,
            Some((
                NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 6).unwrap()
            ))
        );
        assert_eq!(book.images.len(), 1);
        assert_eq!(book.chapters[1].href, "text/02_side_stories_cats.xhtml");
        assert!(book.chapters[1].xhtml.contains("<h1>Side Stories: &lt;Cats&gt;</h1>"));
        assert!(book.title_page().contains("January 16, 2024 to February 6, 2024"));
    }

    #[tokio::test]
    async fn test_write_epub_container() {
        let articles = vec![article(
            "Episode 1",
            "Seanan McGuire",
            "January 16, 2024",
            r#"<p>The body<br>was <img src="https://cdn.example/art.png"></p>"#,
        )];
        let book = Book::plan("Murders at Karlov Manor", &articles).unwrap();
        let client = ScriptedClient::new(404).body("https://cdn.example/art.png", b"\x89PNG\r\n".to_vec());
        let images = fetch_images(&client, &book).await;
        assert_eq!(images.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(book.file_name());
        write_epub(&book, &images, None, &path).unwrap();

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.iter().any(|n| n.ends_with("image/art.png")));
        let chapter = names
            .iter()
            .find(|n| n.ends_with("01_episode_1.xhtml"))
            .expect("chapter entry")
            .clone();
        let mut xhtml = String::new();
        archive.by_name(&chapter).unwrap().read_to_string(&mut xhtml).unwrap();
        assert!(xhtml.contains(r#"<img src="../image/art.png" />"#));
        assert!(xhtml.contains("<br />"));
    }

    #[tokio::test]
    async fn test_missing_images_are_skipped() {
        let articles = vec![article("One", "", "", r#"<img src="https://cdn.example/gone.jpg">"#)];
        let book = Book::plan("X", &articles).unwrap();
        let client = ScriptedClient::new(404);
        assert!(fetch_images(&client, &book).await.is_empty());
    }
}
