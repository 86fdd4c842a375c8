use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::job::JobPayload;

/// Response after submitting a sticker generation request.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    pub waiting: usize,
    pub active: usize,
    pub message: String,
}

/// POST /api/v1/stickers — submit a source image for sticker generation.
///
/// Multipart fields: `image` (raster upload) or `source_url` (remote
/// locator), `owner_id`, optional `channel_id` and `display_name`.
pub async fn submit_sticker_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut source_url: Option<String> = None;
    let mut owner_id: Option<i64> = None;
    let mut channel_id: Option<i64> = None;
    let mut display_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("image") => {
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                // Reject payloads that are not a decodable raster up front.
                image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
                image_data = Some(data.to_vec());
            }
            Some("source_url") => {
                source_url = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("owner_id") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                owner_id = Some(text.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("channel_id") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                channel_id = Some(text.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("display_name") => {
                display_name = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    let owner_id = owner_id.ok_or(StatusCode::BAD_REQUEST)?;
    let channel_id = channel_id.unwrap_or(owner_id);
    let display_name = display_name.unwrap_or_else(|| format!("user{owner_id}"));

    // Acquire the source: uploaded bytes win over a remote locator.
    let (source_path, source_url) = match (image_data, source_url) {
        (Some(bytes), url) => {
            let path = state.fetcher.store(&bytes, owner_id).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to persist uploaded image");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            (path, url.unwrap_or_default())
        }
        (None, Some(url)) => {
            let path = state.fetcher.fetch(&url, owner_id).await.map_err(|e| {
                tracing::error!(error = %e, url = %url, "Failed to download source image");
                StatusCode::BAD_GATEWAY
            })?;
            (path, url)
        }
        (None, None) => return Err(StatusCode::BAD_REQUEST),
    };

    let payload = JobPayload {
        owner_id,
        display_name,
        channel_id,
        source_url,
        source_path,
    };

    let job_id = state.queue.enqueue(payload).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to enqueue job");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    metrics::counter!("sticker_jobs_total").increment(1);

    let stats = state.queue.stats().await.unwrap_or_default();
    Ok(Json(SubmitResponse {
        job_id: job_id.to_string(),
        status: "queued".to_string(),
        waiting: stats.waiting,
        active: stats.active,
        message: "Sticker set queued for generation".to_string(),
    }))
}
