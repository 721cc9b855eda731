use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use futures_util::TryStreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{DownloadQuery, ProgressResponse, UploadQuery, UploadResponse};
use crate::pages;
use crate::progress::ProgressReader;
use crate::state::AppState;
use crate::utils::upload_basename;

// upload page, the same for every client
pub async fn index_page() -> Html<String> {
    Html(pages::upload_page())
}

// download list rendered from the current catalog
pub async fn download_list_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let files = state.catalog.list();
    tracing::debug!("Rendering download page with {} files", files.len());
    Html(pages::download_page(&files))
}

// stream one multipart file field to disk while recording progress
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let upload_id = required(query.upload_id, "uploadId")?;

    // the page declares the file size; other clients fall back to the body length
    let total = query
        .size
        .or_else(|| content_length(&headers))
        .ok_or(Error::LengthRequired)?;
    if total > state.max_upload_size {
        return Err(Error::PayloadTooLarge {
            size: total,
            limit: state.max_upload_size,
        });
    }

    let session = state.sessions.begin(&upload_id, total)?;
    tracing::debug!("Processing upload {} ({} bytes declared)", upload_id, total);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, state.max_upload_size))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        let filename =
            upload_basename(&raw_name).ok_or_else(|| Error::InvalidFileName(raw_name.clone()))?;
        let file_path = state.upload_dir.join(&filename);
        // written under a name only this request knows, renamed once complete
        let mut part = PartFile {
            path: state.upload_dir.join(format!(".{}.part", Uuid::new_v4())),
            persisted: false,
        };
        tracing::trace!("Upload {} target path: {:?}", upload_id, file_path);

        let mut file = fs::File::create(&part.path).await.map_err(|e| {
            tracing::error!("Failed to create file for {}: {}", filename, e);
            Error::Io(e)
        })?;

        let body = StreamReader::new(field.map_err(io::Error::other));
        tokio::pin!(body);
        let sessions = &state.sessions;
        let mut reader = ProgressReader::new(body, |n| sessions.advance(&upload_id, n));

        let written = async {
            let n = tokio::io::copy(&mut reader, &mut file).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&part.path, &file_path).await?;
            Ok::<u64, io::Error>(n)
        }
        .await;

        let size = match written {
            Ok(size) => {
                part.persisted = true;
                size
            }
            Err(e) => {
                tracing::error!("Failed to save {}: {}", filename, e);
                return Err(body_read_error(e, state.max_upload_size));
            }
        };

        drop(session);
        tracing::info!("✅ Uploaded file: {} ({} bytes)", filename, size);

        return Ok(Json(UploadResponse {
            success: true,
            filename,
            size,
        }));
    }

    tracing::warn!("Upload {} contained no file field", upload_id);
    Err(Error::NoFileField)
}

/// private file an upload streams into; removed on drop unless renamed into
/// place, which also covers the client going away mid-body
struct PartFile {
    path: PathBuf,
    persisted: bool,
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial file {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove partial file {:?}: {}", self.path, e),
        }
    }
}

fn multipart_error(e: &MultipartError, limit: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::BodyTooLarge { limit }
    } else {
        Error::Multipart(e.body_text())
    }
}

// body errors reach the copy wrapped in io::Error
fn body_read_error(e: io::Error, limit: u64) -> Error {
    match e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
    {
        Some(multipart) => multipart_error(multipart, limit),
        None => Error::Io(e),
    }
}

// current counters for an upload, zero/zero when unknown or finished
pub async fn upload_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
) -> Result<Json<ProgressResponse>> {
    let upload_id = required(query.upload_id, "uploadId")?;
    Ok(Json(state.sessions.snapshot(&upload_id).unwrap_or_default()))
}

// stream a catalog file as an attachment
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let name = required(query.file, "file")?;
    let entry = state
        .catalog
        .find(&name)
        .ok_or_else(|| Error::NotFound(name.clone()))?;

    let file = fs::File::open(&entry.path).await.map_err(|e| {
        tracing::error!("Failed to open {:?}: {}", entry.path, e);
        Error::Io(e)
    })?;
    let length = file.metadata().await.map(|m| m.len()).ok();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, attachment(&entry.name));
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    tracing::info!("📤 Sending {} ({} KB)", entry.name, entry.size_kb);
    // headers are gone by the time a read fails, so all we can do is log it
    let stream = ReaderStream::new(file)
        .inspect_err(move |e| tracing::error!("Failed while sending {}: {}", name, e));

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingParam(name))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8 name
pub fn attachment(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC);
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
