use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use mediarelay_core::{TransferRequest, TypeHint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Percent-encoded source URL: a direct media link or a page embedding media
    pub url: Option<String>,
    /// Optional hint: `photo`, `animated_image`, `video` or `audio`
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Public URL on the destination host
    pub url: String,
}

/// Parse a client-supplied hint; unknown values are dropped, not rejected.
pub(crate) fn parse_hint(raw: Option<&str>) -> Option<TypeHint> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let hint = TypeHint::parse(raw);
    if hint.is_none() {
        tracing::debug!(hint = raw, "Ignoring unknown type hint");
    }
    hint
}

#[utoipa::path(
    get,
    path = "/upload",
    tag = "relay",
    params(UploadQuery),
    responses(
        (status = 200, description = "Media relayed to the destination host", body = UploadResponse),
        (status = 400, description = "Missing or invalid URL", body = ErrorResponse),
        (status = 413, description = "Source exceeds the size limit", body = ErrorResponse),
        (status = 415, description = "Source is not media", body = ErrorResponse),
        (status = 422, description = "Page embeds no media", body = ErrorResponse),
        (status = 502, description = "Source or destination failure", body = ErrorResponse),
        (status = 503, description = "Destination unreachable", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, query),
    fields(
        url = query.url.as_deref().unwrap_or(""),
        operation = "upload_from_url"
    )
)]
pub async fn upload_from_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let request = TransferRequest::new(
        query.url.unwrap_or_default(),
        parse_hint(query.media_type.as_deref()),
    );

    let result = state.transfers.transfer(&request).await?;

    Ok(Json(UploadResponse {
        success: true,
        url: result.public_url,
    }))
}
