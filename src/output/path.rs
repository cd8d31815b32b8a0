//! Deterministic path layout for downloaded series
//!
//! ```text
//! <root>/<series title>/<NNN - chapter title>/<PPP>.<ext>
//! ```
//!
//! Chapter and page numbers are 1-based and zero-padded to at least three
//! digits, or wider when the count needs it. Every component is sanitized with
//! [`sanitize_component`].
//!
//! # Usage Example
//!
//! ```rust
//! use comic_downloader::output::OutputPathBuilder;
//! use std::path::PathBuf;
//!
//! let builder = OutputPathBuilder::new(PathBuf::from("downloads"), "One Punch-Man");
//! let page = builder.page_destination(2, 150, "Chapter 2: Rival?", 7, 20);
//!
//! assert_eq!(
//!     page.path_with_extension("jpg"),
//!     PathBuf::from("downloads/One Punch-Man/002 - Chapter 2 Rival/007.jpg")
//! );
//! ```

use crate::downloader::unit::PageDestination;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Longest component kept verbatim, in bytes
pub const MAX_COMPONENT_BYTES: usize = 100;

/// Extensions recognised as page images, in lookup order
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "avif", "svg"];

/// Fallback when nothing identifies the image format
pub const DEFAULT_EXTENSION: &str = "jpg";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Path builder for one series
#[derive(Debug, Clone)]
pub struct OutputPathBuilder {
    root_dir: PathBuf,
    series_dir: String,
}

impl OutputPathBuilder {
    /// Create a builder rooted at `root_dir` for the given series title
    pub fn new(root_dir: PathBuf, series_title: &str) -> Self {
        Self {
            root_dir,
            series_dir: sanitize_component(series_title),
        }
    }

    /// `<root>/<series>`
    pub fn series_dir(&self) -> PathBuf {
        self.root_dir.join(&self.series_dir)
    }

    /// Directory name for chapter `index` of `chapter_count`
    pub fn chapter_dir_name(index: usize, chapter_count: usize, title: &str) -> String {
        let number = pad_number(index, chapter_count);
        let title = clean(title);
        if title.is_empty() {
            number
        } else {
            sanitize_component(&format!("{number} - {title}"))
        }
    }

    /// `<root>/<series>/<NNN - title>`
    pub fn chapter_dir(&self, index: usize, chapter_count: usize, title: &str) -> PathBuf {
        self.series_dir()
            .join(Self::chapter_dir_name(index, chapter_count, title))
    }

    /// File stem of page `index` of `page_count`
    pub fn page_stem(index: usize, page_count: usize) -> String {
        pad_number(index, page_count)
    }

    /// Destination of one page
    pub fn page_destination(
        &self,
        chapter_index: usize,
        chapter_count: usize,
        chapter_title: &str,
        page_index: usize,
        page_count: usize,
    ) -> PageDestination {
        PageDestination::new(
            self.chapter_dir(chapter_index, chapter_count, chapter_title),
            Self::page_stem(page_index, page_count),
        )
    }
}

/// Zero-pad width for `count` items: at least 3 digits
pub fn pad_width(count: usize) -> usize {
    count.max(1).to_string().len().max(3)
}

fn pad_number(index: usize, count: usize) -> String {
    format!("{:0width$}", index, width = pad_width(count.max(index)))
}

/// Strip forbidden and control characters, collapse whitespace and trim
/// trailing dots and spaces
fn clean(name: &str) -> String {
    let stripped: String = name
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c == '.' || c == ' ')
        .to_string()
}

/// Make a single path component safe on every mainstream filesystem
///
/// Empty results become `untitled`; Windows device names get a trailing `_`;
/// components longer than [`MAX_COMPONENT_BYTES`] are cut and suffixed with
/// the first 8 hex digits of their SHA-256 so distinct long names stay
/// distinct and the same name always maps to the same path.
pub fn sanitize_component(name: &str) -> String {
    let mut cleaned = clean(name);
    if cleaned.is_empty() {
        return "untitled".to_string();
    }

    let base = cleaned.split('.').next().unwrap_or_default();
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
    {
        cleaned.push('_');
    }

    if cleaned.len() <= MAX_COMPONENT_BYTES {
        return cleaned;
    }

    let digest = Sha256::digest(cleaned.as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let mut cut = MAX_COMPONENT_BYTES - suffix.len() - 1;
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = cleaned[..cut].trim_end_matches(|c: char| c == '.' || c == ' ');
    format!("{head}-{suffix}")
}

/// Choose a file extension: content type, then byte signature, then URL
/// suffix, then [`DEFAULT_EXTENSION`]
pub fn resolve_extension(content_type: Option<&str>, bytes: &[u8], url: &str) -> &'static str {
    content_type
        .and_then(extension_from_content_type)
        .or_else(|| sniff_image_extension(bytes))
        .or_else(|| extension_from_url(url))
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Map an image MIME type to an extension
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/avif" => Some("avif"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// Identify common image formats by their leading bytes
pub fn sniff_image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.len() >= 12 && &bytes[4..12] == b"ftypavif" {
        Some("avif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else if looks_like_svg(bytes) {
        Some("svg")
    } else {
        None
    }
}

/// `<svg`, possibly after an XML declaration, comments or a doctype
fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") {
        return true;
    }
    (text.starts_with("<?xml") || text.starts_with("<!--") || text.starts_with("<!DOCTYPE svg"))
        && text.contains("<svg")
}

/// Known image extension at the end of the URL path
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let ext = Path::new(&path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpeg" | "jpg" => Some("jpg"),
        other => IMAGE_EXTENSIONS.iter().find(|known| **known == other).copied(),
    }
}
