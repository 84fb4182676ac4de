//! Request handlers for the match API.

use axum::extract::{Multipart, Query, State};
use axum::Json;

use crate::error::ApiError;
use crate::AppState;

/// Timeout for fetching a remote query image.
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub async fn home() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "vismatch API is running" }))
}

#[derive(Debug, serde::Deserialize)]
pub struct MatchParams {
    /// Remote image URL, alternative to the multipart `file` field.
    pub url: Option<String>,
    /// Minimum similarity score for a catalog item to be returned.
    #[serde(default)]
    pub min_score: f32,
}

/// `POST /match`: embed the query image, predict its category, and return
/// the ranked same-category matches.
///
/// The query image comes from exactly one of two sources: a multipart field
/// named `file`, or the `url` query parameter. Fetching and encoding happen
/// here, before the engine is invoked; the engine never sees a partial or
/// failed embedding.
pub async fn match_image(
    State(state): State<AppState>,
    Query(params): Query<MatchParams>,
    multipart: Option<Multipart>,
) -> Result<Json<vismatch_engine::MatchResponse>, ApiError> {
    let bytes = match read_upload(multipart).await? {
        Some(bytes) => bytes,
        None => match &params.url {
            Some(url) => fetch_image(&state.http, url).await?,
            None => {
                return Err(ApiError::bad_request(
                    "Provide either an image file or a URL.",
                ))
            }
        },
    };

    // ONNX inference is synchronous; keep it off the async workers.
    let provider = state.provider.clone();
    let query = tokio::task::spawn_blocking(move || provider.encode_image(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("encoder task failed: {e}")))??;

    let response = state.engine.matches(&query, params.min_score)?;
    Ok(Json(response))
}

/// Pull the `file` field out of a multipart body, if one was sent.
async fn read_upload(multipart: Option<Multipart>) -> Result<Option<Vec<u8>>, ApiError> {
    let Some(mut multipart) = multipart else {
        return Ok(None);
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
            return Ok(Some(bytes.to_vec()));
        }
    }

    Ok(None)
}

async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, ApiError> {
    let fetch = async {
        let response = http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await
    };

    match fetch.await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(e) => Err(ApiError::bad_request(format!("Could not fetch image: {e}"))),
    }
}
