//! HTTP handlers for `/files/{*path}`.
//!
//! HEAD answers existence and size only. GET resolves the object, validates
//! the `Range` header against the resolved size and hands the rest to the
//! `StreamingResponder`, which streams the body without buffering it.

use crate::{
    errors::AppError,
    models::{object::ObjectPath, range::RangeSpec},
    services::proxy_service::ProxyService,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

/// HEAD `/files/{*path}` — `Content-Length` of the object, never a body.
pub async fn head_file(
    State(service): State<ProxyService>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let path = ObjectPath::from(path);
    let handle = service
        .resolve(&path)
        .await
        .map_err(|err| AppError::from(err).without_length())?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(handle.size()));
    Ok(response)
}

/// GET `/files/{*path}` — full or single-range body.
pub async fn get_file(
    State(service): State<ProxyService>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = ObjectPath::from(path);
    let handle = service.resolve(&path).await?;
    let size = handle.size();

    let range_header = match headers.get(header::RANGE) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::range_not_satisfiable("range header is not valid ascii", size)
        })?),
        None => None,
    };

    match range_header {
        Some(range) => tracing::info!("{}: {} (size={})", path, range, size),
        None => tracing::info!("{}: all data (size={})", path, size),
    }

    let range = RangeSpec::parse(range_header, size)
        .map_err(|err| AppError::range_not_satisfiable(err.to_string(), size))?;
    let response = service
        .responder
        .respond(service.store.as_ref(), &handle, &range)
        .await?;
    Ok(response)
}
