//! Generic media extraction from an HTML document.
//!
//! Pure: takes the page text and the URL it was served from, returns the
//! ranked candidate list. No network access happens here.

use std::collections::HashSet;

use mediarelay_core::{AppError, MediaCandidate, MediaKind};
use scraper::{Html, Selector};
use url::Url;

use crate::media_type::{extension_from_url, kind_for_extension, rank_for_url};

struct Rule {
    selector: &'static str,
    attr: &'static str,
    kind: MediaKind,
}

const RULES: &[Rule] = &[
    Rule {
        selector: "video source[src]",
        attr: "src",
        kind: MediaKind::Video,
    },
    Rule {
        selector: "video[src]",
        attr: "src",
        kind: MediaKind::Video,
    },
    Rule {
        selector: r#"meta[property="og:video"], meta[name="og:video"]"#,
        attr: "content",
        kind: MediaKind::Video,
    },
    Rule {
        selector: r#"meta[property="og:video:secure_url"], meta[name="og:video:secure_url"]"#,
        attr: "content",
        kind: MediaKind::Video,
    },
    Rule {
        selector: r#"meta[name="twitter:player:stream"], meta[property="twitter:player:stream"]"#,
        attr: "content",
        kind: MediaKind::Video,
    },
    Rule {
        selector: "img[src]",
        attr: "src",
        kind: MediaKind::Image,
    },
    Rule {
        selector: r#"meta[property="og:image"], meta[name="og:image"]"#,
        attr: "content",
        kind: MediaKind::Image,
    },
    Rule {
        selector: r#"meta[name="twitter:image"], meta[property="twitter:image"]"#,
        attr: "content",
        kind: MediaKind::Image,
    },
    Rule {
        selector: "audio source[src]",
        attr: "src",
        kind: MediaKind::Audio,
    },
    Rule {
        selector: "audio[src]",
        attr: "src",
        kind: MediaKind::Audio,
    },
];

const CANONICAL_SELECTOR: &str = r#"link[rel~="canonical"][href]"#;

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Internal(format!("Invalid selector {}: {}", css, e)))
}

/// Attribute values that can never be a fetchable media URL
fn is_unusable_reference(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    raw.is_empty()
        || raw.starts_with('#')
        || lower.starts_with("data:")
        || lower.starts_with("javascript:")
        || lower.starts_with("blob:")
        || lower.starts_with("about:")
}

/// Absolute (`https://...`), protocol-relative (`//cdn/...`) or rooted (`/media/...`)
fn is_explicit_reference(raw: &str) -> bool {
    raw.starts_with('/') || Url::parse(raw).is_ok()
}

#[derive(Default)]
struct Collector {
    seen: HashSet<String>,
    found: Vec<MediaCandidate>,
}

impl Collector {
    fn push(&mut self, raw: &str, base: &Url, kind: MediaKind) {
        let raw = raw.trim();
        if is_unusable_reference(raw) {
            return;
        }

        let Ok(url) = base.join(raw) else {
            tracing::trace!(reference = raw, "Skipping unresolvable media reference");
            return;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return;
        }

        // Without a recognised media suffix, only trust references that were
        // written out explicitly.
        if rank_for_url(&url) == 3 && !is_explicit_reference(raw) {
            return;
        }

        if self.seen.insert(url.as_str().to_string()) {
            self.found.push(MediaCandidate {
                url,
                kind_hint: kind,
            });
        }
    }
}

/// Extract embedded media URLs from `html`, best candidate first.
///
/// Candidates are collected video rules first, then image, then audio, then a
/// canonical link with a media suffix. They are then ordered by file type
/// (video, image, audio, other) keeping discovery order within a tier.
pub fn extract_media(html: &str, base: &Url) -> Result<Vec<MediaCandidate>, AppError> {
    let document = Html::parse_document(html);
    let mut collector = Collector::default();

    for rule in RULES {
        let sel = selector(rule.selector)?;
        for element in document.select(&sel) {
            if let Some(value) = element.value().attr(rule.attr) {
                collector.push(value, base, rule.kind);
            }
        }
    }

    let canonical = selector(CANONICAL_SELECTOR)?;
    for element in document.select(&canonical) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            continue;
        };
        if let Some(ext) = extension_from_url(&url) {
            let kind = kind_for_extension(&ext);
            if kind != MediaKind::Unknown {
                collector.push(href, base, kind);
            }
        }
    }

    let mut candidates = collector.found;
    candidates.sort_by_key(|c| rank_for_url(&c.url));

    if candidates.is_empty() {
        return Err(AppError::NoMediaFound(format!(
            "No embedded video, image or audio found on {}",
            base
        )));
    }

    tracing::debug!(
        page = %base,
        candidates = candidates.len(),
        best = %candidates[0].url,
        "Extracted media candidates"
    );

    Ok(candidates)
}
