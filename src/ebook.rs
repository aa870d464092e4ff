use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum EbookError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed epub: {0}")]
    Malformed(String),
}

/// An image referenced from a chapter, with its archive link and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterImage {
    pub link: String,
    pub data: Vec<u8>,
}

/// One document of an EPUB, in both HTML and plain-text form.
///
/// Invariant: `length == plain.chars().count()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub filename: String,
    pub html: String,
    pub plain: String,
    pub length: usize,
    /// Intra-book link targets found in this chapter.
    pub links: Vec<String>,
    pub images: Vec<ChapterImage>,
}

impl Chapter {
    pub fn new(filename: String, html: String, plain: String) -> Self {
        let length = plain.chars().count();
        Self {
            filename,
            html,
            plain,
            length,
            links: Vec::new(),
            images: Vec::new(),
        }
    }

    /// A chapter whose HTML is just its text; handy for tests and for
    /// plain-text sources.
    pub fn from_plain(filename: String, plain: &str) -> Self {
        Self::new(filename, plain.to_string(), plain.to_string())
    }
}

/// A parsed EPUB: metadata plus its spine-ordered chapters.
#[derive(Debug, Clone)]
pub struct Epub {
    pub title: String,
    pub author: String,
    pub chapters: Vec<Chapter>,
}

impl Epub {
    /// Open and fully parse an EPUB. Chapters that cannot be read are
    /// skipped with a warning; the rest of the book still loads.
    pub fn open(path: &Path) -> Result<Self, EbookError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let container = read_archive_string(&mut archive, "META-INF/container.xml")?;
        let opf_path = rootfile_path(&container)?;
        let opf_dir = parent_dir(&opf_path);
        let opf = read_archive_string(&mut archive, &opf_path)?;
        let package = parse_package(&opf)?;

        let mut chapters = Vec::with_capacity(package.spine.len());
        for idref in &package.spine {
            let Some(item) = package.manifest.iter().find(|i| &i.id == idref) else {
                warn!(idref, "spine idref missing from manifest; skipped");
                continue;
            };
            if !item.media_type.contains("html") {
                continue;
            }
            let entry = join_path(&opf_dir, &item.href);
            let html = match read_archive_string(&mut archive, &entry) {
                Ok(html) => html,
                Err(err) => {
                    warn!(entry, %err, "unreadable chapter skipped");
                    continue;
                }
            };
            let extracted = extract_text(&html);
            let mut chapter = Chapter::new(entry.clone(), html, extracted.plain);
            chapter.links = extracted.links;
            let chapter_dir = parent_dir(&entry);
            for src in extracted.image_links {
                let image_entry = join_path(&chapter_dir, &src);
                match read_archive_bytes(&mut archive, &image_entry) {
                    Ok(data) => chapter.images.push(ChapterImage { link: src, data }),
                    Err(err) => warn!(image_entry, %err, "chapter image unavailable"),
                }
            }
            chapters.push(chapter);
        }

        Ok(Self {
            title: package.title,
            author: package.author,
            chapters,
        })
    }
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
}

struct Package {
    title: String,
    author: String,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
}

fn read_archive_string<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, EbookError> {
    let mut entry = archive.by_name(name)?;
    let mut out = String::new();
    entry.read_to_string(&mut out)?;
    Ok(out)
}

fn read_archive_bytes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, EbookError> {
    let mut entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out)?;
    Ok(out)
}

/// Pull the OPF location out of META-INF/container.xml.
fn rootfile_path(container: &str) -> Result<String, EbookError> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"full-path" {
                            return Ok(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(EbookError::Malformed(format!("container.xml: {e}"))),
        }
    }
    Err(EbookError::Malformed("no rootfile in container.xml".into()))
}

/// Parse the OPF package: dc:title, dc:creator, manifest items and spine
/// order.
fn parse_package(opf: &str) -> Result<Package, EbookError> {
    let mut reader = Reader::from_str(opf);
    let mut package = Package {
        title: String::new(),
        author: String::new(),
        manifest: Vec::new(),
        spine: Vec::new(),
    };
    let mut capture: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match e.local_name().as_ref() {
                    b"title" => capture = Some("title"),
                    b"creator" => capture = Some("creator"),
                    b"item" => {
                        let mut item = ManifestItem {
                            id: String::new(),
                            href: String::new(),
                            media_type: String::new(),
                        };
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).into_owned();
                            match attr.key.local_name().as_ref() {
                                b"id" => item.id = value,
                                b"href" => item.href = value,
                                b"media-type" => item.media_type = value,
                                _ => {}
                            }
                        }
                        package.manifest.push(item);
                    }
                    b"itemref" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"idref" {
                                package
                                    .spine
                                    .push(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(field) = capture.take() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    match field {
                        "title" if package.title.is_empty() => package.title = text,
                        "creator" if package.author.is_empty() => package.author = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => capture = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(EbookError::Malformed(format!("package document: {e}"))),
        }
    }
    Ok(package)
}

/// Plain text, links and image references pulled from chapter XHTML.
pub struct ExtractedText {
    pub plain: String,
    pub links: Vec<String>,
    pub image_links: Vec<String>,
}

const BLOCK_TAGS: [&[u8]; 16] = [
    b"p", b"div", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"li", b"tr", b"blockquote",
    b"section", b"article", b"header", b"footer", b"figcaption",
];

/// Flatten chapter XHTML into typable plain text: block elements become
/// newline-separated paragraphs with inner whitespace collapsed; script,
/// style and head content is dropped.
pub fn extract_text(html: &str) -> ExtractedText {
    let mut reader = Reader::from_str(html);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut links = Vec::new();
    let mut image_links = Vec::new();
    let mut skip_depth = 0usize;

    let mut flush = |current: &mut String, paragraphs: &mut Vec<String>| {
        let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
        current.clear();
        if !normalized.is_empty() {
            paragraphs.push(normalized);
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"script" | b"style" | b"head" | b"title") {
                    skip_depth += 1;
                } else if BLOCK_TAGS.contains(&name.as_ref()) {
                    flush(&mut current, &mut paragraphs);
                } else if name.as_ref() == b"a" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"href" {
                            links.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"script" | b"style" | b"head" | b"title") {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if BLOCK_TAGS.contains(&name.as_ref()) {
                    flush(&mut current, &mut paragraphs);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"br" {
                    flush(&mut current, &mut paragraphs);
                } else if name.as_ref() == b"img" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"src" {
                            image_links.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    match t.unescape() {
                        Ok(text) => current.push_str(&text),
                        Err(_) => current.push_str(&String::from_utf8_lossy(t.as_ref())),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%e, "chapter markup error; text truncated here");
                break;
            }
        }
    }
    flush(&mut current, &mut paragraphs);

    ExtractedText {
        plain: paragraphs.join("\n"),
        links,
        image_links,
    }
}

fn parent_dir(entry: &str) -> String {
    match entry.rfind('/') {
        Some(idx) => entry[..idx].to_string(),
        None => String::new(),
    }
}

/// Resolve `href` relative to `base` inside the archive namespace.
fn join_path(base: &str, href: &str) -> String {
    let mut parts: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').collect()
    };
    for piece in href.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
