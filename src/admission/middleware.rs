use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{AdmissionGateway, Profile};
use crate::http::errors::ApiError;

/// Peer address recorded by `into_make_service_with_connect_info`
pub fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Runs the HTTP admission profile ahead of every wrapped route
pub async fn http_admission(
    State(gateway): State<Arc<AdmissionGateway>>,
    req: Request,
    next: Next,
) -> Response {
    if gateway.is_bypass() {
        return next.run(req).await;
    }

    let ctx = gateway.context(
        Profile::Http,
        req.method(),
        req.uri(),
        req.headers(),
        peer_addr(&req),
    );
    match gateway.admit(&ctx).await {
        Ok(()) => next.run(req).await,
        Err(e) => ApiError::from_admission(&e).into_response(),
    }
}
