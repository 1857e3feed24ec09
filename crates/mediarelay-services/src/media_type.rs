//! Mapping between content types, file extensions and media kinds.

use mediarelay_core::{MediaKind, TypeHint};
use url::Url;

pub const DEFAULT_EXTENSION: &str = "tmp";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "gif", "jpeg"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3"];

const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/ogg", "ogg"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("application/pdf", "pdf"),
];

/// Lowercased MIME essence (`text/html; charset=utf-8` -> `text/html`).
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

pub fn is_html(content_type: &str) -> bool {
    matches!(
        mime_essence(content_type).as_str(),
        "text/html" | "application/xhtml+xml"
    )
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = mime_essence(content_type);
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == essence)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for_extension(extension: &str) -> &'static str {
    let extension = extension.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        _ => CONTENT_TYPE_EXTENSIONS
            .iter()
            .find(|(_, ext)| *ext == extension)
            .map(|(ct, _)| *ct)
            .unwrap_or("application/octet-stream"),
    }
}

/// Extension of the last path segment, if it looks like one.
pub fn extension_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn kind_for_extension(extension: &str) -> MediaKind {
    let extension = extension.to_lowercase();
    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Image
    } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Unknown
    }
}

/// Ranking tier of a media URL: video files first, then images, then audio,
/// then anything else.
pub fn rank_for_url(url: &Url) -> u8 {
    match extension_from_url(url).map(|ext| kind_for_extension(&ext)) {
        Some(MediaKind::Video) => 0,
        Some(MediaKind::Image) => 1,
        Some(MediaKind::Audio) => 2,
        _ => 3,
    }
}

/// Extension for a persisted file: type hint, then content type, then URL
/// suffix, then `tmp`.
pub fn resolve_extension(hint: Option<TypeHint>, content_type: Option<&str>, url: &Url) -> String {
    if let Some(hint) = hint {
        return hint.extension().to_string();
    }

    if let Some(ext) = content_type.and_then(extension_for_content_type) {
        return ext.to_string();
    }

    extension_from_url(url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_extension_priority() {
        let u = url("https://cdn.example.com/media/clip.webm?x=1");

        assert_eq!(resolve_extension(Some(TypeHint::Video), Some("image/png"), &u), "mp4");
        assert_eq!(resolve_extension(None, Some("image/png; charset=binary"), &u), "png");
        assert_eq!(resolve_extension(None, Some("application/octet-stream"), &u), "webm");
        assert_eq!(resolve_extension(None, None, &u), "webm");
        assert_eq!(
            resolve_extension(None, None, &url("https://cdn.example.com/media/12345")),
            "tmp"
        );
    }

    #[test]
    fn test_extension_from_url_ignores_odd_suffixes() {
        assert_eq!(extension_from_url(&url("https://x.com/a/b.JPG")), Some("jpg".to_string()));
        assert_eq!(extension_from_url(&url("https://x.com/a/.hidden")), None);
        assert_eq!(extension_from_url(&url("https://x.com/v1.2/watch")), None);
        assert_eq!(extension_from_url(&url("https://x.com/file.verylong")), None);
        assert_eq!(extension_from_url(&url("https://x.com/")), None);
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=UTF-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("image/jpeg"));
        assert!(!is_html("application/json"));
    }

    #[test]
    fn test_rank_order() {
        assert_eq!(rank_for_url(&url("https://x/a.MOV")), 0);
        assert_eq!(rank_for_url(&url("https://x/a.jpeg")), 1);
        assert_eq!(rank_for_url(&url("https://x/a.mp3")), 2);
        assert_eq!(rank_for_url(&url("https://x/a.webp")), 3);
        assert_eq!(rank_for_url(&url("https://x/watch?v=1")), 3);
    }

    #[test]
    fn test_content_type_for_extension() {
        assert_eq!(content_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(content_type_for_extension("mp4"), "video/mp4");
        assert_eq!(content_type_for_extension("tmp"), "application/octet-stream");
    }
}
