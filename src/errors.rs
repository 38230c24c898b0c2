use crate::services::{
    menu_service::MenuError, metadata::MetadataError, responder::OpenError, store::StoreError,
};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::{convert::Infallible, fmt};

/// An HTTP-facing error. Clients only ever see the status and headers;
/// the message stays in the logs.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub headers: HeaderMap,
    /// Leave `Content-Length` off the response entirely.
    pub omit_length: bool,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            headers: HeaderMap::new(),
            omit_length: false,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// 416 with the `bytes */{size}` form of `Content-Range`.
    pub fn range_not_satisfiable(msg: impl Into<String>, size: u64) -> Self {
        let mut err = Self::new(StatusCode::RANGE_NOT_SATISFIABLE, msg);
        if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
            err.headers.insert(header::CONTENT_RANGE, value);
        }
        err
    }

    /// Answers to HEAD must not advertise a length for a body that does not
    /// exist. An empty body of unknown size keeps axum from adding `0`.
    pub fn without_length(mut self) -> Self {
        self.omit_length = true;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!("{} {}", self.status, self.message);
        } else {
            tracing::debug!("{} {}", self.status, self.message);
        }

        let body = if self.omit_length {
            Body::from_stream(futures::stream::empty::<Result<Bytes, Infallible>>())
        } else {
            Body::empty()
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found(err.to_string()),
            StoreError::Backend(_) => AppError::new(StatusCode::BAD_GATEWAY, err.to_string()),
        }
    }
}

impl From<OpenError> for AppError {
    fn from(err: OpenError) -> Self {
        match err {
            OpenError::Store(inner) => inner.into(),
            OpenError::Timeout(_) => AppError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        }
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        AppError::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<MenuError> for AppError {
    fn from(err: MenuError) -> Self {
        match err {
            MenuError::UnknownExperiment(_) => AppError::not_found(err.to_string()),
            MenuError::Metadata(inner) => inner.into(),
            MenuError::Catalog(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
