use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use super::AppState;
use crate::RelayError;

/// GET / - liveness
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "message": "SceneFinder cloud backend is running"
        })),
    )
}

/// POST /api/process-video - fetch, transcode and forward the audio of `url`
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return RelayError::InvalidInput(rejection.body_text()).into_response();
        }
    };

    let url = body.get("url").and_then(Value::as_str);

    match state.pipeline.process(url).await {
        Ok(render_response) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "renderResponse": render_response,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
