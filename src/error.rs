//! Error types shared by the transfer service, the catalog and the console.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::models::ErrorResponse;

#[derive(Error, Debug)]
pub enum Error {
    /// A required query parameter was absent or empty.
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    /// The client supplied a file name that has no usable basename.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// The multipart body could not be parsed.
    #[error("failed to read multipart body: {0}")]
    Multipart(String),

    /// The multipart body had no `file` field.
    #[error("no file provided")]
    NoFileField,

    /// Neither a declared size nor a Content-Length was sent.
    #[error("upload size unknown: send a Content-Length header or a size parameter")]
    LengthRequired,

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// The body ran past the limit while it was being read.
    #[error("request body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Another upload already uses this session id.
    #[error("upload id already in use: {0}")]
    SessionInUse(String),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// The catalog already offers a file under this display name.
    #[error("a file named {0:?} is already in the download list")]
    DuplicateName(String),

    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("unknown command: {0:?} (try `help`)")]
    UnknownCommand(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode QR code: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status reported when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingParam(_)
            | Error::InvalidFileName(_)
            | Error::Multipart(_)
            | Error::NoFileField
            | Error::InvalidPort(_)
            | Error::UnknownCommand(_) => StatusCode::BAD_REQUEST,
            Error::LengthRequired => StatusCode::LENGTH_REQUIRED,
            Error::PayloadTooLarge { .. } | Error::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::SessionInUse(_) | Error::DuplicateName(_) => StatusCode::CONFLICT,
            Error::NotAFile(_)
            | Error::Bind { .. }
            | Error::Qr(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!("rejected request: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
