//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mediarelay API",
        version = "0.1.0",
        description = "Relays media from a source URL, or from the page embedding it, to a public file host and returns the hosted URL."
    ),
    paths(
        handlers::upload::upload_from_url,
        handlers::upload_multiple::upload_multiple,
    ),
    components(
        schemas(
            error::ErrorResponse,
            handlers::upload::UploadResponse,
            handlers::upload_multiple::Attachment,
            handlers::upload_multiple::UploadMultipleRequest,
            handlers::upload_multiple::UploadMultipleResponse,
        )
    ),
    tags(
        (name = "relay", description = "Media relay endpoints")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_relay_paths() {
        let spec = get_openapi_spec();
        assert!(spec.paths.paths.contains_key("/upload"));
        assert!(spec.paths.paths.contains_key("/upload-multiple"));
    }
}
