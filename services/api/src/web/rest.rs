//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::SessionError;
use crate::session::TurnInput;
use crate::web::protocol::{
    AnalysisResponse, AnalyzeTextRequest, ChatModeDto, DepressionDto, EmotionBreakdownDto,
    EmotionDto, RecommendationDto, ReportResponse, RiskResponse, SendMessageRequest,
    StartSessionRequest, StartSessionResponse, TrendPoint, TrendResponse, TurnResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use companion_core::{EventSource, PortError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;

/// The error half of every handler result.
pub type HandlerError = (StatusCode, String);

type HandlerResult<T> = Result<(StatusCode, Json<T>), HandlerError>;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_session_handler,
        send_message_handler,
        send_audio_handler,
        session_image_handler,
        end_session_handler,
        analyze_text_handler,
        upload_image_handler,
        risk_handler,
        trend_handler,
        report_handler,
    ),
    components(
        schemas(
            ChatModeDto,
            StartSessionRequest,
            StartSessionResponse,
            SendMessageRequest,
            TurnResponse,
            EmotionDto,
            DepressionDto,
            AnalysisResponse,
            AnalyzeTextRequest,
            RiskResponse,
            TrendPoint,
            TrendResponse,
            EmotionBreakdownDto,
            RecommendationDto,
            ReportResponse,
        )
    ),
    tags(
        (name = "Companion API", description = "Chat sessions and emotional well-being analysis.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Request Helpers
//=========================================================================================

/// Reads and validates the `x-user-id` header.
pub fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, HandlerError> {
    let user_id_str = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "x-user-id header is required".to_string(),
            )
        })?;

    Uuid::parse_str(user_id_str).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Invalid x-user-id format".to_string(),
        )
    })
}

/// Checks that the `x-user-id` header names the user in the path.
pub fn authorize_user(headers: &HeaderMap, path_user_id: Uuid) -> Result<Uuid, HandlerError> {
    let user_id = user_id_from_headers(headers)?;
    if user_id != path_user_id {
        return Err((
            StatusCode::FORBIDDEN,
            "x-user-id does not match the user in the path".to_string(),
        ));
    }
    Ok(user_id)
}

fn session_failure(e: SessionError) -> HandlerError {
    (e.status_code(), e.to_string())
}

fn port_failure(context: &str, e: PortError) -> HandlerError {
    error!("{}: {}", context, e);
    let status = match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, context.to_string())
}

/// Collects every named multipart part into memory.
async fn read_parts(multipart: &mut Multipart) -> Result<HashMap<String, Bytes>, HandlerError> {
    let mut parts = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read part '{}': {}", name, e),
            )
        })?;
        parts.insert(name, data);
    }
    Ok(parts)
}

fn required_part(parts: &mut HashMap<String, Bytes>, name: &str) -> Result<Bytes, HandlerError> {
    match parts.remove(name) {
        Some(data) if !data.is_empty() => Ok(data),
        _ => Err((
            StatusCode::BAD_REQUEST,
            format!("Multipart form must include a non-empty '{}' part", name),
        )),
    }
}

/// Decodes a plain base64 string or a `data:<mime>;base64,` URL.
pub fn decode_image_base64(encoded: &str) -> Result<Vec<u8>, HandlerError> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    STANDARD.decode(payload.trim()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("image_base64 is not valid base64: {}", e),
        )
    })
}

//=========================================================================================
// Chat Session Handlers
//=========================================================================================

/// Start a new chat session.
///
/// Text sessions also start background camera capture when a camera is configured.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started", body = StartSessionResponse),
        (status = 400, description = "Missing or invalid x-user-id header")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<StartSessionRequest>,
) -> HandlerResult<StartSessionResponse> {
    let user_id = user_id_from_headers(&headers)?;
    let started = app_state
        .sessions
        .start_session(user_id, request.mode.into())
        .await
        .map_err(session_failure)?;
    info!("Started {:?} session {} for user {}.", request.mode, started.session_id, user_id);
    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse::new(started, user_id, request.mode)),
    ))
}

/// Send a typed message, optionally with a base64 camera frame.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "The assistant's reply", body = TurnResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not active")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The chat session."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn send_message_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> HandlerResult<TurnResponse> {
    let user_id = user_id_from_headers(&headers)?;
    let image = request
        .image_base64
        .as_deref()
        .map(decode_image_base64)
        .transpose()?;
    let turn = app_state
        .sessions
        .submit_turn(
            session_id,
            user_id,
            TurnInput::Text {
                message: request.message,
                image,
            },
        )
        .await
        .map_err(session_failure)?;
    Ok((StatusCode::OK, Json(turn.into())))
}

/// Send a recorded voice message.
///
/// Multipart parts: `audio` (WAV or raw 16-bit PCM, required) and `image` (optional frame).
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/audio",
    request_body(content_type = "multipart/form-data", description = "An `audio` part and an optional `image` part."),
    responses(
        (status = 200, description = "The assistant's reply with the transcript", body = TurnResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not active")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The chat session."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn send_audio_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> HandlerResult<TurnResponse> {
    let user_id = user_id_from_headers(&headers)?;
    let mut parts = read_parts(&mut multipart).await?;
    let audio = required_part(&mut parts, "audio")?;
    let image = parts.remove("image").filter(|b| !b.is_empty());

    let turn = app_state
        .sessions
        .submit_turn(
            session_id,
            user_id,
            TurnInput::Audio {
                audio: audio.to_vec(),
                image: image.map(|b| b.to_vec()),
            },
        )
        .await
        .map_err(session_failure)?;
    Ok((StatusCode::OK, Json(turn.into())))
}

/// Analyze a photo shared inside the chat.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/images",
    request_body(content_type = "multipart/form-data", description = "An `image` part."),
    responses(
        (status = 200, description = "Emotion and risk for the image", body = AnalysisResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not active")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The chat session."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn session_image_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> HandlerResult<AnalysisResponse> {
    let user_id = user_id_from_headers(&headers)?;
    let mut parts = read_parts(&mut multipart).await?;
    let image = required_part(&mut parts, "image")?;
    let analysis = app_state
        .sessions
        .analyze_image(session_id, user_id, &image)
        .await
        .map_err(session_failure)?;
    Ok((StatusCode::OK, Json(AnalysisResponse::from(&analysis))))
}

/// End a chat session and stop its background capture.
///
/// Ending a recently ended session succeeds again.
#[utoipa::path(
    delete,
    path = "/sessions/{session_id}",
    responses(
        (status = 204, description = "Session ended, or already ended"),
        (status = 404, description = "Session not found")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The chat session."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    let user_id = user_id_from_headers(&headers)?;
    app_state
        .sessions
        .end_session(session_id, user_id)
        .await
        .map_err(session_failure)?;
    info!("Ended session {} for user {}.", session_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Standalone Analysis & Reporting Handlers
//=========================================================================================

/// Analyze a piece of text outside any chat session.
#[utoipa::path(
    post,
    path = "/users/{user_id}/analyze/text",
    request_body = AnalyzeTextRequest,
    responses(
        (status = 200, description = "Emotion and risk for the text", body = AnalysisResponse),
        (status = 400, description = "Text is empty"),
        (status = 403, description = "x-user-id does not match the path")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The unique ID of the user."),
        ("x-user-id" = Uuid, Header, description = "Must match `user_id`.")
    )
)]
pub async fn analyze_text_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AnalyzeTextRequest>,
) -> HandlerResult<AnalysisResponse> {
    let user_id = authorize_user(&headers, user_id)?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text must not be empty".to_string()));
    }
    let analysis = app_state.analyzer.analyze_text(user_id, text).await;
    Ok((StatusCode::OK, Json(AnalysisResponse::from(&analysis))))
}

/// Analyze an uploaded photo outside any chat session.
#[utoipa::path(
    post,
    path = "/users/{user_id}/images",
    request_body(content_type = "multipart/form-data", description = "An `image` part."),
    responses(
        (status = 200, description = "Emotion and risk for the image", body = AnalysisResponse),
        (status = 400, description = "Missing image"),
        (status = 403, description = "x-user-id does not match the path")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The unique ID of the user."),
        ("x-user-id" = Uuid, Header, description = "Must match `user_id`.")
    )
)]
pub async fn upload_image_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    mut multipart: Multipart,
) -> HandlerResult<AnalysisResponse> {
    let user_id = authorize_user(&headers, user_id)?;
    let mut parts = read_parts(&mut multipart).await?;
    let image = required_part(&mut parts, "image")?;
    let analysis = app_state
        .analyzer
        .analyze_image(user_id, &image, EventSource::Image)
        .await;
    Ok((StatusCode::OK, Json(AnalysisResponse::from(&analysis))))
}

/// Average risk over the user's most recent events.
#[utoipa::path(
    get,
    path = "/users/{user_id}/risk",
    responses(
        (status = 200, description = "Aggregate risk", body = RiskResponse),
        (status = 403, description = "x-user-id does not match the path"),
        (status = 503, description = "Persistence unavailable")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The unique ID of the user."),
        ("x-user-id" = Uuid, Header, description = "Must match `user_id`.")
    )
)]
pub async fn risk_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> HandlerResult<RiskResponse> {
    let user_id = authorize_user(&headers, user_id)?;
    let summary = app_state
        .analyzer
        .risk_summary(user_id)
        .await
        .map_err(|e| port_failure("Failed to compute risk summary", e))?;
    Ok((StatusCode::OK, Json(summary.into())))
}

/// Depression score history, most recent first.
#[utoipa::path(
    get,
    path = "/users/{user_id}/trend",
    responses(
        (status = 200, description = "Score history", body = TrendResponse),
        (status = 403, description = "x-user-id does not match the path"),
        (status = 503, description = "Persistence unavailable")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The unique ID of the user."),
        ("x-user-id" = Uuid, Header, description = "Must match `user_id`.")
    )
)]
pub async fn trend_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> HandlerResult<TrendResponse> {
    let user_id = authorize_user(&headers, user_id)?;
    let records = app_state
        .analyzer
        .trend(user_id)
        .await
        .map_err(|e| port_failure("Failed to load depression trend", e))?;
    let points = records.iter().map(TrendPoint::from).collect();
    Ok((StatusCode::OK, Json(TrendResponse { points })))
}

/// Generate and archive a depression report from recent events.
#[utoipa::path(
    post,
    path = "/users/{user_id}/report",
    responses(
        (status = 200, description = "The generated report", body = ReportResponse),
        (status = 403, description = "x-user-id does not match the path"),
        (status = 503, description = "Persistence unavailable")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The unique ID of the user."),
        ("x-user-id" = Uuid, Header, description = "Must match `user_id`.")
    )
)]
pub async fn report_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> HandlerResult<ReportResponse> {
    let user_id = authorize_user(&headers, user_id)?;
    let report = app_state
        .analyzer
        .generate_report(user_id)
        .await
        .map_err(|e| port_failure("Failed to generate depression report", e))?;
    info!("Generated {} report for user {}.", report.level, user_id);
    Ok((StatusCode::OK, Json(ReportResponse::from(&report))))
}
