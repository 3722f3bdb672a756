use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::logging;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id, available to handlers as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

fn incoming_request_id(req: &Request) -> Option<String> {
    let value = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > 128 {
        return None;
    }
    Some(value.to_string())
}

/// Tags every request with an id and writes request/response access lines
pub async fn access_log(mut req: Request, next: Next) -> Response {
    let request_id = incoming_request_id(&req).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    logging::log_request(method.as_str(), &path, Some(&request_id));

    let mut response = next.run(req).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    logging::log_response(
        method.as_str(),
        &path,
        response.status().as_u16(),
        duration_ms,
        Some(&request_id),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
