//! Test helpers: build the relay router against a mock source/destination.
//!
//! Run from workspace root: `cargo test -p mediarelay-api`.

#![allow(dead_code)]

use axum_test::TestServer;
use mediarelay_api::setup::{routes, services};
use mediarelay_api::AppState;
use mediarelay_core::{Config, RelayConfig};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DESTINATION_PATH: &str = "/user/api.php";

/// Test application: server, mock upstream, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub upstream: MockServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Absolute URL of `path` on the mock upstream.
    pub fn source_url(&self, path: &str) -> String {
        format!("{}{}", self.upstream.uri(), path)
    }

    /// Serve `body` at `p` with the given content type.
    pub async fn serve(&self, p: &str, content_type: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, content_type),
            )
            .mount(&self.upstream)
            .await;
    }

    /// Make the destination answer every upload with `body`.
    pub async fn destination_answers(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path(DESTINATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.upstream)
            .await;
    }

    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self._temp_dir.path()).unwrap().count()
    }
}

pub fn create_test_config(upstream: &MockServer, temp_dir: &TempDir) -> Config {
    Config::new(RelayConfig {
        destination_url: format!("{}{}", upstream.uri(), DESTINATION_PATH),
        allow_private_hosts: true,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
        fetch_timeout_secs: 5,
        upload_timeout_secs: 5,
        max_batch_size: 3,
        temp_dir: temp_dir.path().to_path_buf(),
        ..RelayConfig::default()
    })
}

/// Setup test app with an isolated scratch directory and mock upstream.
pub async fn setup_test_app() -> TestApp {
    let upstream = MockServer::start().await;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config = create_test_config(&upstream, &temp_dir);

    let state = services::initialize_services(&config)
        .await
        .expect("Failed to initialize services");
    let router = routes::setup_routes(&config, state.clone()).expect("Failed to setup routes");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        upstream,
        state,
        _temp_dir: temp_dir,
    }
}
