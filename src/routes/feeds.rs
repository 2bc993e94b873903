use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, warn};

use crate::models::{
    AppState, CreateFeedResponse, DeleteFeedResponse, FeedEntry, FeedListResponse, FeedRequest,
    ImagePayload, PipelineResponse,
};
use crate::storage::parse_owner_address;
use crate::types::{AppError, AppResult};
use crate::utils::ImageSpool;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-feed", post(create_feed))
        .route("/api/feeds", post(run_pipeline))
        // GET takes an owner address, DELETE a feed index
        .route("/api/feeds/{key}", get(list_feeds).delete(delete_feed))
}

/// Read the `image` and `prompt` fields. The image is spooled to disk while it
/// streams in and the spool file is gone by the time this returns.
async fn read_feed_form(state: &AppState, mut multipart: Multipart) -> AppResult<FeedRequest> {
    let mut prompt = None;
    let mut image = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid prompt field: {}", e)))?;
                prompt = Some(text);
            }
            "image" => {
                let mime_type = field.content_type().unwrap_or_default().to_string();
                if !mime_type.starts_with("image/") {
                    return Err(AppError::validation("Only images are allowed"));
                }
                let original_name = field.file_name().map(str::to_string);

                let server = &state.config.server;
                let mut spool = ImageSpool::create(&server.upload_dir, server.max_image_bytes).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::validation(format!("Failed to read image: {}", e)))?
                {
                    spool.write_chunk(&chunk).await?;
                }
                image = Some(spool.finish(mime_type, original_name).await?);
            }
            other => {
                warn!(field = %other, "Ignoring unexpected form field");
            }
        }
    }

    Ok(FeedRequest { prompt, image })
}

/// Relay: image + prompt to the vision model, generated text straight back
async fn create_feed(State(state): State<AppState>, multipart: Multipart) -> AppResult<Json<CreateFeedResponse>> {
    let request = read_feed_form(&state, multipart).await?;
    let image = match request.image.as_ref() {
        Some(image) if !image.bytes.is_empty() => image,
        _ => return Err(AppError::validation("No image uploaded")),
    };

    info!(image_bytes = image.bytes.len(), "Relaying feed generation request");
    let content = state.generator.generate_content(request.prompt_text(), image).await?;

    Ok(Json(CreateFeedResponse {
        success: true,
        content: Some(content.text),
        image: Some(ImagePayload {
            data: STANDARD.encode(&image.bytes),
            mimetype: image.mime_type.clone(),
            original_name: image.original_name.clone().unwrap_or_default(),
        }),
        error: None,
    }))
}

async fn run_pipeline(State(state): State<AppState>, multipart: Multipart) -> Response {
    let request = match read_feed_form(&state, multipart).await {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.orchestrator.create_feed(request).await {
        Ok(receipt) => Json(PipelineResponse {
            success: true,
            cid: receipt.upload.cid,
            bucket: receipt.upload.bucket,
            tx_hash: format!("{:?}", receipt.receipt.hash),
            content: receipt.content,
            feeds: receipt.feeds.as_deref().map(FeedEntry::from_records),
        })
        .into_response(),
        Err(failure) => failure.into_response(),
    }
}

async fn list_feeds(State(state): State<AppState>, Path(owner): Path<String>) -> AppResult<Json<FeedListResponse>> {
    let owner = parse_owner_address(&owner)?;
    let records = state.orchestrator.list_feeds(owner).await?;

    Ok(Json(FeedListResponse {
        success: true,
        owner,
        feeds: FeedEntry::from_records(&records),
    }))
}

async fn delete_feed(State(state): State<AppState>, Path(index): Path<u64>) -> AppResult<Json<DeleteFeedResponse>> {
    let receipt = state.orchestrator.delete_feed(index).await?;

    Ok(Json(DeleteFeedResponse {
        success: true,
        index: receipt.index,
        tx_hash: format!("{:?}", receipt.receipt.hash),
        feeds: receipt.feeds.as_deref().map(FeedEntry::from_records),
    }))
}
