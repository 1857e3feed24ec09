//! Post-syndication shortcut for short-form social posts.
//!
//! Status URLs of the form `https://x.com/<user>/status/<id>` are resolved
//! through the public syndication JSON endpoint instead of scraping the
//! (script-rendered) page. The endpoint wants a token derived from the post
//! ID: base-36 of `(id / 1e15) * π` with every `0` and `.` removed.

use std::f64::consts::PI;

use async_trait::async_trait;
use mediarelay_core::{AppError, MediaCandidate, MediaKind};
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::ExtractionStrategy;
use crate::fetcher::ContentFetcher;

pub const DEFAULT_SYNDICATION_ENDPOINT: &str = "https://cdn.syndication.twimg.com/tweet-result";

const STATUS_URL_PATTERN: &str =
    r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/[A-Za-z0-9_]+/status(?:es)?/(\d+)";

pub struct SyndicationStrategy {
    pattern: Regex,
    endpoint: String,
}

impl SyndicationStrategy {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AppError> {
        let pattern = Regex::new(STATUS_URL_PATTERN)
            .map_err(|e| AppError::Internal(format!("Invalid status URL pattern: {}", e)))?;
        Ok(Self {
            pattern,
            endpoint: endpoint.into(),
        })
    }

    pub fn post_id(&self, url: &Url) -> Option<u64> {
        self.pattern
            .captures(url.as_str())
            .and_then(|caps| caps.get(1))
            .and_then(|id| id.as_str().parse().ok())
    }

    fn api_url(&self, post_id: u64) -> Result<Url, AppError> {
        let mut api = Url::parse(&self.endpoint).map_err(|e| {
            AppError::Internal(format!("Invalid syndication endpoint {}: {}", self.endpoint, e))
        })?;
        api.query_pairs_mut()
            .append_pair("id", &post_id.to_string())
            .append_pair("token", &syndication_token(post_id));
        Ok(api)
    }
}

#[async_trait]
impl ExtractionStrategy for SyndicationStrategy {
    fn name(&self) -> &'static str {
        "syndication"
    }

    fn matches(&self, url: &Url) -> bool {
        self.post_id(url).is_some()
    }

    async fn resolve(
        &self,
        url: &Url,
        fetcher: &ContentFetcher,
    ) -> Result<Vec<MediaCandidate>, AppError> {
        let post_id = self
            .post_id(url)
            .ok_or_else(|| AppError::Validation(format!("{} is not a status URL", url)))?;

        let payload = fetcher.fetch_json(&self.api_url(post_id)?).await?;
        Ok(media_from_payload(&payload))
    }
}

/// Token expected by the syndication endpoint for `post_id`.
pub fn syndication_token(post_id: u64) -> String {
    let value = (post_id as f64 / 1e15) * PI;
    to_radix_string(value, 36)
        .chars()
        .filter(|c| *c != '0' && *c != '.')
        .collect()
}

/// Shortest radix representation of a non-negative float that reads back to
/// the same value, fractional digits included.
fn to_radix_string(value: f64, radix: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let radix_f = radix as f64;
    let mut integer = value.trunc();
    let mut fraction = value - integer;

    // Half the distance to the next representable double; digits below it are noise.
    let next_up = f64::from_bits(value.to_bits() + 1);
    let mut delta = (0.5 * (next_up - value)).max(f64::from_bits(1));

    let mut fraction_digits: Vec<u32> = Vec::new();
    if fraction >= delta {
        loop {
            fraction *= radix_f;
            delta *= radix_f;
            let digit = fraction.floor() as u32;
            fraction_digits.push(digit);
            fraction -= digit as f64;

            if (fraction > 0.5 || (fraction == 0.5 && digit & 1 == 1)) && fraction + delta > 1.0 {
                // Round up, carrying into the integer part if every digit overflows.
                loop {
                    match fraction_digits.pop() {
                        None => {
                            integer += 1.0;
                            break;
                        }
                        Some(d) if d + 1 < radix => {
                            fraction_digits.push(d + 1);
                            break;
                        }
                        Some(_) => {}
                    }
                }
                break;
            }

            if fraction < delta {
                break;
            }
        }
    }

    let mut integer_digits = Vec::new();
    loop {
        let digit = (integer % radix_f) as usize;
        integer_digits.push(DIGITS[digit] as char);
        integer = ((integer - digit as f64) / radix_f).trunc();
        if integer < 1.0 {
            break;
        }
    }

    let mut out: String = integer_digits.into_iter().rev().collect();
    if !fraction_digits.is_empty() {
        out.push('.');
        out.extend(fraction_digits.iter().map(|d| DIGITS[*d as usize] as char));
    }
    out
}

/// Media URLs in a syndication payload: the best mp4 of each video, then photos.
fn media_from_payload(payload: &Value) -> Vec<MediaCandidate> {
    let mut candidates = Vec::new();

    let details = payload
        .get("mediaDetails")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for item in details {
        let media_type = item.get("type").and_then(Value::as_str).unwrap_or("");
        if matches!(media_type, "video" | "animated_gif") {
            if let Some(url) = best_mp4_variant(item) {
                candidates.push(MediaCandidate {
                    url,
                    kind_hint: MediaKind::Video,
                });
                continue;
            }
        }
        if let Some(url) = item
            .get("media_url_https")
            .and_then(Value::as_str)
            .and_then(|s| Url::parse(s).ok())
        {
            candidates.push(MediaCandidate {
                url,
                kind_hint: MediaKind::Image,
            });
        }
    }

    if candidates.is_empty() {
        let photos = payload
            .get("photos")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        candidates.extend(photos.iter().filter_map(|photo| {
            let url = Url::parse(photo.get("url")?.as_str()?).ok()?;
            Some(MediaCandidate {
                url,
                kind_hint: MediaKind::Image,
            })
        }));
    }

    candidates
}

fn best_mp4_variant(item: &Value) -> Option<Url> {
    item.get("video_info")?
        .get("variants")?
        .as_array()?
        .iter()
        .filter(|v| v.get("content_type").and_then(Value::as_str) == Some("video/mp4"))
        .max_by_key(|v| v.get("bitrate").and_then(Value::as_u64).unwrap_or(0))
        .and_then(|v| v.get("url")?.as_str())
        .and_then(|s| Url::parse(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strategy() -> SyndicationStrategy {
        SyndicationStrategy::new(DEFAULT_SYNDICATION_ENDPOINT).unwrap()
    }

    #[test]
    fn test_matches_status_urls_only() {
        let s = strategy();
        let cases = [
            ("https://x.com/someone/status/1790000000000000000", Some(1790000000000000000)),
            ("https://twitter.com/some_one/status/20?s=46", Some(20)),
            ("https://mobile.twitter.com/a/statuses/123", Some(123)),
            ("https://x.com/someone", None),
            ("https://example.com/someone/status/123", None),
        ];
        for (raw, expected) in cases {
            let url = Url::parse(raw).unwrap();
            assert_eq!(s.post_id(&url), expected, "{raw}");
            assert_eq!(s.matches(&url), expected.is_some());
        }
    }

    #[test]
    fn test_to_radix_string() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
        assert_eq!(to_radix_string(0.25, 36), "0.9");
        assert_eq!(to_radix_string(36.0, 36), "10");
        assert_eq!(to_radix_string(0.0, 36), "0");
    }

    #[test]
    fn test_token_is_deterministic_and_stripped() {
        let token = syndication_token(1790000000000000000);
        assert_eq!(token, syndication_token(1790000000000000000));
        assert!(!token.is_empty());
        assert!(!token.contains('0'));
        assert!(!token.contains('.'));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, syndication_token(1790000000000000001 + 1_000_000_000_000));
    }

    #[test]
    fn test_api_url_carries_id_and_token() {
        let api = strategy().api_url(20).unwrap();
        let pairs: Vec<(String, String)> = api.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("id".to_string(), "20".to_string()));
        assert_eq!(pairs[1].0, "token");
        assert_eq!(pairs[1].1, syndication_token(20));
    }

    #[test]
    fn test_payload_prefers_highest_bitrate_mp4() {
        let payload = json!({
            "mediaDetails": [
                {
                    "type": "video",
                    "media_url_https": "https://pbs.example.com/thumb.jpg",
                    "video_info": { "variants": [
                        { "content_type": "application/x-mpegURL", "url": "https://video.example.com/pl.m3u8" },
                        { "content_type": "video/mp4", "bitrate": 256000, "url": "https://video.example.com/low.mp4" },
                        { "content_type": "video/mp4", "bitrate": 2176000, "url": "https://video.example.com/high.mp4" }
                    ]}
                },
                { "type": "photo", "media_url_https": "https://pbs.example.com/photo.jpg" }
            ]
        });

        let candidates = media_from_payload(&payload);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url.as_str(), "https://video.example.com/high.mp4");
        assert_eq!(candidates[0].kind_hint, MediaKind::Video);
        assert_eq!(candidates[1].url.as_str(), "https://pbs.example.com/photo.jpg");
    }

    #[test]
    fn test_payload_falls_back_to_photos() {
        let payload = json!({ "photos": [ { "url": "https://pbs.example.com/a.jpg" } ] });
        let candidates = media_from_payload(&payload);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind_hint, MediaKind::Image);

        assert!(media_from_payload(&json!({ "text": "no media" })).is_empty());
    }
}
