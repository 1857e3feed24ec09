use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::upload::parse_hint;
use crate::state::AppState;
use axum::{extract::State, Json};
use mediarelay_core::{AppError, TransferRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Attachment {
    /// Source URL of one attachment
    #[serde(default)]
    pub url: String,
    /// Optional hint: `photo`, `animated_image`, `video` or `audio`
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadMultipleRequest {
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadMultipleResponse {
    pub success: bool,
    /// Public URLs of the attachments that went through, in request order
    pub urls: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/upload-multiple",
    tag = "relay",
    request_body = UploadMultipleRequest,
    responses(
        (status = 200, description = "At least one attachment was relayed", body = UploadMultipleResponse),
        (status = 400, description = "Invalid body, empty or oversized batch, or no attachment relayed", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(
        attachments = request.attachments.len(),
        operation = "upload_multiple"
    )
)]
pub async fn upload_multiple(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UploadMultipleRequest>,
) -> Result<Json<UploadMultipleResponse>, HttpAppError> {
    let count = request.attachments.len();
    if count == 0 {
        return Err(AppError::Validation("At least one attachment is required".to_string()).into());
    }

    let max = state.config.max_batch_size();
    if count > max {
        return Err(AppError::Validation(format!(
            "Too many attachments: {} exceeds the limit of {}",
            count, max
        ))
        .into());
    }

    let requests = request
        .attachments
        .into_iter()
        .map(|a| TransferRequest::new(a.url, parse_hint(a.media_type.as_deref())))
        .collect();

    let urls = state.transfers.transfer_batch(requests).await.into_urls()?;

    Ok(Json(UploadMultipleResponse {
        success: true,
        urls,
    }))
}
