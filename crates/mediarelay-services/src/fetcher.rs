//! Source fetching
//!
//! GETs remote resources with a browser-like header set, retries transient
//! failures, and either streams the body into a transient file or buffers a
//! page for extraction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use mediarelay_core::AppError;
use mediarelay_infra::{retry_recoverable, RetryPolicy};
use mediarelay_storage::TransientFile;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::redirect::Policy;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::media_type;

const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT_SECS: u64 = 10;

const ACCEPT_PAGE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_BINARY: &str = "*/*";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// What the caller is prepared to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Media payload only; an HTML response is an error
    Binary,
    /// HTML is accepted so it can be handed to extraction
    Page,
}

#[derive(Clone, Debug)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub user_agents: Vec<String>,
    pub retry: RetryPolicy,
}

pub struct ContentFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
    next_agent: AtomicUsize,
}

/// A successful response whose body has not been read yet
#[derive(Debug)]
pub struct FetchedResponse {
    /// URL after redirects
    pub final_url: Url,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    response: reqwest::Response,
    max_bytes: u64,
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Transport(format!("request timed out: {}", err))
    } else {
        AppError::Transport(err.to_string())
    }
}

/// `Referer` for a request: the origin of the URL being fetched.
fn origin_referer(url: &Url) -> Option<String> {
    let origin = url.origin();
    origin
        .is_tuple()
        .then(|| format!("{}/", origin.ascii_serialization()))
}

impl ContentFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            next_agent: AtomicUsize::new(0),
        })
    }

    fn next_user_agent(&self) -> &str {
        if self.config.user_agents.is_empty() {
            return "Mozilla/5.0";
        }
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.config.user_agents.len();
        &self.config.user_agents[index]
    }

    /// GET `url`, retrying transport failures and retryable statuses.
    #[tracing::instrument(skip(self, url), fields(url = %url))]
    pub async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<FetchedResponse, AppError> {
        let response = retry_recoverable(&self.config.retry, |_| self.send(url, mode)).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if mode == FetchMode::Binary {
            if let Some(ct) = content_type.as_deref().filter(|ct| media_type::is_html(ct)) {
                return Err(AppError::UnexpectedContentType {
                    expected: "binary media".to_string(),
                    actual: media_type::mime_essence(ct),
                });
            }
        }

        let content_length = response.content_length();
        if let Some(size) = content_length.filter(|len| *len > self.config.max_bytes) {
            return Err(AppError::FileTooLarge {
                size,
                max: self.config.max_bytes,
            });
        }

        tracing::debug!(
            final_url = %response.url(),
            content_type = content_type.as_deref().unwrap_or("-"),
            content_length = ?content_length,
            "Fetched source"
        );

        Ok(FetchedResponse {
            final_url: response.url().clone(),
            content_type,
            content_length,
            response,
            max_bytes: self.config.max_bytes,
        })
    }

    /// GET a JSON document.
    pub async fn fetch_json(&self, url: &Url) -> Result<serde_json::Value, AppError> {
        let text = self.fetch(url, FetchMode::Binary).await?.into_text().await?;
        serde_json::from_str(&text).map_err(|e| {
            AppError::UpstreamStatus {
                status: 502,
                message: format!("Invalid JSON from {}: {}", url, e),
            }
        })
    }

    async fn send(&self, url: &Url, mode: FetchMode) -> Result<reqwest::Response, AppError> {
        let accept = match mode {
            FetchMode::Binary => ACCEPT_BINARY,
            FetchMode::Page => ACCEPT_PAGE,
        };

        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.next_user_agent())
            .header(ACCEPT, accept)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE);

        if let Some(referer) = origin_referer(url) {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }

        Ok(response)
    }
}

impl FetchedResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(media_type::is_html)
            .unwrap_or(false)
    }

    /// The body as a stream of chunks, capped at the configured size.
    pub fn into_byte_stream(self) -> impl Stream<Item = Result<Bytes, AppError>> {
        let max = self.max_bytes;
        let mut seen: u64 = 0;
        self.response
            .bytes_stream()
            .map_err(transport_error)
            .and_then(move |chunk| {
                seen += chunk.len() as u64;
                let outcome = if seen > max {
                    Err(AppError::FileTooLarge { size: seen, max })
                } else {
                    Ok(chunk)
                };
                futures::future::ready(outcome)
            })
    }

    /// Buffer the whole body into a string, e.g. a page to extract media from.
    pub async fn into_text(self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        let mut stream = Box::pin(self.into_byte_stream());
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Stream the body into `file`, returning the number of bytes written.
    pub async fn persist(self, file: &mut TransientFile) -> Result<u64, AppError> {
        let source = self.final_url.clone();
        let mut out = tokio::fs::File::create(file.path()).await?;
        let mut stream = Box::pin(self.into_byte_stream());
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        file.set_size_bytes(written);

        if written == 0 {
            return Err(AppError::NoMediaFound(format!(
                "{} returned an empty body",
                source
            )));
        }

        tracing::debug!(
            path = %file.path().display(),
            size_bytes = written,
            "Persisted source to transient file"
        );

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarelay_storage::TempStore;
    use tempfile::tempdir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> ContentFetcher {
        fetcher_with_limit(1024 * 1024)
    }

    fn fetcher_with_limit(max_bytes: u64) -> ContentFetcher {
        ContentFetcher::new(FetcherConfig {
            timeout: Duration::from_secs(5),
            max_bytes,
            user_agents: vec!["agent-a".to_string(), "agent-b".to_string()],
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        })
        .unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_origin_referer() {
        let u = Url::parse("https://cdn.example.com:8443/a/b.jpg?x=1").unwrap();
        assert_eq!(origin_referer(&u).as_deref(), Some("https://cdn.example.com:8443/"));
    }

    #[tokio::test]
    async fn test_sends_browser_headers_and_rotates_agents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pic.jpg"))
            .and(header_exists("user-agent"))
            .and(header("referer", format!("{}/", server.uri()).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF]),
            )
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        fetcher.fetch(&url(&server, "/pic.jpg"), FetchMode::Binary).await.unwrap();
        fetcher.fetch(&url(&server, "/pic.jpg"), FetchMode::Binary).await.unwrap();

        let agents: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.headers.get("user-agent").unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(agents, vec!["agent-a", "agent-b"]);
    }

    #[tokio::test]
    async fn test_rejects_html_when_binary_expected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&url(&server, "/page"), FetchMode::Binary)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UnexpectedContentType { ref actual, .. } if actual == "text/html"
        ));

        let page = fetcher()
            .fetch(&url(&server, "/page"), FetchMode::Page)
            .await
            .unwrap();
        assert!(page.is_html());
        assert_eq!(page.into_text().await.unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.png"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"\x89PNG".to_vec()),
            )
            .mount(&server)
            .await;

        let response = fetcher()
            .fetch(&url(&server, "/flaky.png"), FetchMode::Binary)
            .await
            .unwrap();

        assert_eq!(response.content_type.as_deref(), Some("image/png"));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&url(&server, "/missing.jpg"), FetchMode::Binary)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let err = fetcher()
            .fetch(&Url::parse("http://127.0.0.1:1/a.jpg").unwrap(), FetchMode::Binary)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
    }

    #[tokio::test]
    async fn test_persist_streams_body_to_transient_file() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let store = TempStore::new(dir.path()).await.unwrap();
        let mut file = store.allocate("mp4");

        let written = fetcher()
            .fetch(&url(&server, "/clip.mp4"), FetchMode::Binary)
            .await
            .unwrap()
            .persist(&mut file)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(file.size_bytes(), body.len() as u64);
        assert_eq!(tokio::fs::read(file.path()).await.unwrap(), body);
        file.release().await;
    }

    #[tokio::test]
    async fn test_rejects_oversized_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4096]))
            .mount(&server)
            .await;

        let err = fetcher_with_limit(1024)
            .fetch(&url(&server, "/big.bin"), FetchMode::Binary)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { size: 4096, max: 1024 }));
    }
}
