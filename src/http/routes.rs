use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{error, info, warn};

use crate::error::ServiceError;
use crate::service::PaletteService;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Status plus optional JSON body; `None` means an empty body (204).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        ApiResponse { status, body: Some(body) }
    }

    pub fn no_content() -> Self {
        ApiResponse { status: 204, body: None }
    }

    pub fn not_found() -> Self {
        ApiResponse::json(404, json!({ "error": "Not found" }))
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

/// CORS headers sent on every response, preflight or not.
fn cors_headers() -> Vec<Header> {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
        ("Access-Control-Allow-Headers", "Content-Type"),
    ]
    .iter()
    .filter_map(|(k, v)| header(k, v))
    .collect()
}

pub fn into_response(api: ApiResponse) -> Response<Cursor<Vec<u8>>> {
    let mut headers = cors_headers();
    let bytes = match &api.body {
        Some(body) => {
            headers.extend(header("Content-Type", "application/json"));
            body.to_string().into_bytes()
        }
        None => Vec::new(),
    };
    let len = bytes.len();
    Response::new(StatusCode(api.status), headers, Cursor::new(bytes), Some(len), None)
}

fn error_response(err: &ServiceError, service: &PaletteService) -> ApiResponse {
    if err.is_server_error() {
        error!(kind = err.kind(), error = %err, "request failed");
    } else {
        warn!(kind = err.kind(), error = %err, "request rejected");
    }
    ApiResponse::json(err.status(), err.body(service.config().expose_error_details))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request onto a handler. Socket-free so it can be driven directly.
pub fn route(service: &Arc<PaletteService>, method: &Method, path: &str, body: Vec<u8>) -> ApiResponse {
    match (method, path) {
        (Method::Options, _) => ApiResponse::no_content(),

        (Method::Get, "/health") => ApiResponse::json(
            200,
            json!({ "status": "ok", "model": service.segmenter_name() }),
        ),

        (Method::Post, "/process_image") => {
            let svc = Arc::clone(service);
            let result = if body.is_empty() {
                svc.process_image(&body)
            } else {
                service.workers().run(service.config().request_timeout(), move || svc.process_image(&body))
            };
            match result.and_then(|r| serde_json::to_value(r).map_err(|e| ServiceError::Internal(e.to_string()))) {
                Ok(value) => ApiResponse::json(200, value),
                Err(e) => error_response(&e, service),
            }
        }

        (Method::Post, "/assign_colors") => {
            let svc = Arc::clone(service);
            match service.workers().run(service.config().request_timeout(), move || svc.assign_colors(&body)) {
                Ok(value) => ApiResponse::json(200, value),
                Err(e) => error_response(&e, service),
            }
        }

        _ => ApiResponse::not_found(),
    }
}

/// Reads at most `limit` bytes of body; `None` when the body is larger.
fn read_body(request: &mut Request, limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    if request.body_length().map_or(false, |len| len > limit) {
        return Ok(None);
    }
    let mut body = Vec::new();
    request.as_reader().take(limit as u64 + 1).read_to_end(&mut body)?;
    if body.len() > limit {
        return Ok(None);
    }
    Ok(Some(body))
}

/// Handles one request end to end and writes the response.
pub fn dispatch(mut request: Request, service: Arc<PaletteService>) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let limit = service.config().max_body_bytes;
    let api = match read_body(&mut request, limit) {
        Ok(Some(body)) => route(&service, &method, &path, body),
        Ok(None) => error_response(&ServiceError::PayloadTooLarge { limit }, &service),
        Err(e) => error_response(&ServiceError::invalid_with("Could not read request body", e.to_string()), &service),
    };

    let status = api.status;
    if let Err(e) = request.respond(into_response(api)) {
        warn!(error = %e, "client went away before the response was written");
    }
    info!(
        method = %method,
        path = %path,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "handled request"
    );
}
