//! Destination upload
//!
//! The destination host takes a multipart POST with `reqtype=fileupload`, an
//! optional `userhash` account token and the payload as `fileToUpload`, and
//! answers with either the public URL as a bare string or an error message.
//!
//! Files above the chunk threshold are split into fixed-size byte ranges that
//! are posted concurrently, each tagged with its index. The host is expected
//! to reassemble them; the URL it returns for the first chunk to complete is
//! reported as the file's URL. Nothing confirms that reassembly happened.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mediarelay_core::{AppError, UploadResult};
use mediarelay_infra::{retry_recoverable, RetryPolicy};
use reqwest::multipart::{Form, Part};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::io::ReaderStream;
use url::Url;
use uuid::Uuid;

use crate::media_type::content_type_for_extension;

const ERROR_MARKER: &str = "error";
const MAX_LOGGED_BODY_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct UploadEngineConfig {
    pub endpoint: String,
    pub userhash: Option<String>,
    /// Files larger than this are uploaded in chunks
    pub chunk_threshold: u64,
    pub chunk_size: u64,
    pub max_parallel_chunks: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// A byte range of the file sent as one chunk request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
}

/// Split `size` bytes into consecutive ranges of at most `chunk_size` bytes.
pub fn plan_chunks(size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < size {
        let len = chunk_size.min(size - offset);
        chunks.push(ChunkRange {
            index: chunks.len(),
            offset,
            len,
        });
        offset += len;
    }
    chunks
}

fn truncate_for_log(body: &str) -> String {
    body.chars().take(MAX_LOGGED_BODY_CHARS).collect()
}

/// Turn the destination's status and body into a public URL or a typed error.
pub fn interpret_response(status: u16, body: &str) -> Result<UploadResult, AppError> {
    let body = body.trim();

    if status == 429 || (500..600).contains(&status) {
        return Err(AppError::UploadTransport(format!(
            "destination responded with status {}",
            status
        )));
    }

    if body.to_lowercase().starts_with(ERROR_MARKER) {
        return Err(AppError::UploadRejected(truncate_for_log(body)));
    }

    if !(200..300).contains(&status) {
        let detail = if body.is_empty() {
            format!("destination responded with status {}", status)
        } else {
            truncate_for_log(body)
        };
        return Err(AppError::UploadRejected(detail));
    }

    match Url::parse(body) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(UploadResult {
            public_url: body.to_string(),
        }),
        _ => Err(AppError::UploadRejected(format!(
            "unexpected response from destination: {}",
            truncate_for_log(body)
        ))),
    }
}

#[derive(Clone)]
pub struct UploadEngine {
    client: reqwest::Client,
    config: Arc<UploadEngineConfig>,
}

impl UploadEngine {
    pub fn new(config: UploadEngineConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Upload the file at `path`, choosing single or chunked mode by size.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn upload(&self, path: &Path, extension_hint: &str) -> Result<UploadResult, AppError> {
        let size = tokio::fs::metadata(path).await?.len();

        let result = if size <= self.config.chunk_threshold {
            self.upload_single(path, size).await
        } else {
            self.upload_chunked(path, extension_hint, size).await
        }?;

        tracing::info!(
            size_bytes = size,
            public_url = %result.public_url,
            "Upload completed"
        );
        Ok(result)
    }

    /// Ask the destination to fetch `source` itself (`reqtype=urlupload`).
    #[tracing::instrument(skip(self, source), fields(source = %source))]
    pub async fn upload_remote(&self, source: &Url) -> Result<UploadResult, AppError> {
        retry_recoverable(&self.config.retry, |_| async move {
            let form = self
                .base_form("urlupload")
                .text("url", source.to_string());
            self.post(form).await
        })
        .await
    }

    async fn upload_single(&self, path: &Path, size: u64) -> Result<UploadResult, AppError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.tmp")
            .to_string();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("tmp");

        retry_recoverable(&self.config.retry, |_| {
            let file_name = file_name.clone();
            async move {
                let part = file_part(path, 0, size, file_name, extension).await?;
                let form = self.base_form("fileupload").part("fileToUpload", part);
                self.post(form).await
            }
        })
        .await
    }

    async fn upload_chunked(
        &self,
        path: &Path,
        extension: &str,
        size: u64,
    ) -> Result<UploadResult, AppError> {
        let chunks = plan_chunks(size, self.config.chunk_size);
        let total = chunks.len();
        let upload_id = Uuid::new_v4().simple().to_string();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_chunks.max(1)));

        tracing::info!(
            size_bytes = size,
            chunks = total,
            max_parallel = self.config.max_parallel_chunks,
            upload_id = %upload_id,
            "Starting chunked upload"
        );

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            let path = path.to_path_buf();
            let extension = extension.to_string();
            let upload_id = upload_id.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(format!("Chunk semaphore closed: {}", e)))?;
                engine
                    .upload_chunk(&path, &extension, &upload_id, chunk, total)
                    .await
            });
        }

        let mut first_completed: Option<UploadResult> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| AppError::Internal(format!("Chunk upload task failed: {}", e)))
                .and_then(|r| r);

            match outcome {
                Ok(result) => {
                    first_completed.get_or_insert(result);
                }
                Err(e) => {
                    tracing::warn!(upload_id = %upload_id, error = %e, "Chunk upload failed, aborting remaining chunks");
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        first_completed.ok_or_else(|| AppError::Internal("Chunked upload produced no result".to_string()))
    }

    async fn upload_chunk(
        &self,
        path: &Path,
        extension: &str,
        upload_id: &str,
        chunk: ChunkRange,
        total: usize,
    ) -> Result<UploadResult, AppError> {
        let file_name = format!("{}_chunk_{}.{}", upload_id, chunk.index, extension);

        let result = retry_recoverable(&self.config.retry, |_| {
            let file_name = file_name.clone();
            async move {
                let part = file_part(path, chunk.offset, chunk.len, file_name, extension).await?;
                let form = self
                    .base_form("fileupload")
                    .text("upload_id", upload_id.to_string())
                    .text("chunk", chunk.index.to_string())
                    .text("chunks", total.to_string())
                    .part("fileToUpload", part);
                self.post(form).await
            }
        })
        .await?;

        tracing::debug!(
            chunk_index = chunk.index,
            chunk_bytes = chunk.len,
            upload_id = %upload_id,
            "Chunk uploaded"
        );
        Ok(result)
    }

    fn base_form(&self, reqtype: &'static str) -> Form {
        let form = Form::new().text("reqtype", reqtype);
        match &self.config.userhash {
            Some(hash) => form.text("userhash", hash.clone()),
            None => form,
        }
    }

    async fn post(&self, form: Form) -> Result<UploadResult, AppError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::UploadTransport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::UploadTransport(e.to_string()))?;

        interpret_response(status, &body)
    }
}

/// Multipart part streaming `len` bytes of `path` starting at `offset`.
async fn file_part(
    path: &Path,
    offset: u64,
    len: u64,
    file_name: String,
    extension: &str,
) -> Result<Part, AppError> {
    let mut file = tokio::fs::File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }

    let body = reqwest::Body::wrap_stream(ReaderStream::new(file.take(len)));
    Part::stream_with_length(body, len)
        .file_name(file_name)
        .mime_str(content_type_for_extension(extension))
        .map_err(|e| AppError::Internal(format!("Invalid upload content type: {}", e)))
}
