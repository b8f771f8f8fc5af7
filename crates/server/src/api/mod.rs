use axum::{
    body::Bytes,
    extract::multipart::{Multipart, MultipartError},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Deserialize;
use session::Session;
use shared::{
    domain::SessionId,
    error::{ApiError, ErrorCode},
    protocol::FileSummary,
};
use tracing::warn;

pub(crate) type HttpError = (StatusCode, Json<ApiError>);

pub const DATA_FILE_FIELD: &str = "data_file";
pub const SESSION_COOKIE: &str = "csv_session";

#[derive(Debug)]
pub struct IncomingFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Body of the header checkbox form. Browsers omit unchecked boxes entirely.
#[derive(Debug, Default, Deserialize)]
pub struct HeaderForm {
    #[serde(default)]
    pub header: Option<String>,
}

impl HeaderForm {
    pub fn checked(&self) -> bool {
        match self.header.as_deref().map(str::trim) {
            None => false,
            Some(value) => !matches!(
                value.to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "off"
            ),
        }
    }
}

/// Pulls the single `data_file` part out of an upload form. Other parts are
/// skipped.
pub async fn read_data_file(multipart: &mut Multipart) -> Result<IncomingFile, HttpError> {
    let mut found: Option<IncomingFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(DATA_FILE_FIELD) {
            continue;
        }
        if found.is_some() {
            return Err(validation("only one file may be uploaded"));
        }

        let name = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| validation("no file selected"))?;
        let content_type = field
            .content_type()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        found = Some(IncomingFile {
            name,
            content_type,
            bytes,
        });
    }

    found.ok_or_else(|| validation("upload is missing the data_file part"))
}

pub fn store_upload(session: &mut Session, file: &IncomingFile) -> Result<FileSummary, ApiError> {
    session
        .accept_upload(&file.name, file.content_type.as_deref(), &file.bytes)
        .map_err(internal)
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.trim().parse().ok())
}

pub fn session_cookie(id: SessionId) -> HeaderValue {
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub(crate) fn validation(message: impl Into<String>) -> HttpError {
    let message = message.into();
    warn!(%message, "rejected upload request");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(ErrorCode::Validation, message)),
    )
}

pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else {
        ErrorCode::Validation
    };
    warn!(%status, error = %err, "malformed multipart upload");
    (status, Json(ApiError::new(code, err.body_text())))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
