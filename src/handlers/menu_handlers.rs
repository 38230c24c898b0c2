//! IGV menu handlers.
//!
//! Both answer 404 when no metadata store is configured.

use crate::{
    errors::AppError,
    services::{menu_service::MenuService, proxy_service::ProxyService},
};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

fn menus(service: &ProxyService) -> Result<&MenuService, AppError> {
    service
        .menus
        .as_ref()
        .ok_or_else(|| AppError::not_found("no metadata store configured"))
}

/// `GET /data_registry` — newline separated menu URLs.
pub async fn data_registry(State(service): State<ProxyService>) -> Result<Response, AppError> {
    let registry = menus(&service)?.registry().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        registry,
    )
        .into_response())
}

/// `GET /xml/{name}`
pub async fn experiment_menu(
    State(service): State<ProxyService>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let menu = menus(&service)?.experiment_menu(&name).await?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], menu).into_response())
}
