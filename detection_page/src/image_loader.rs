use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

const FILE_FIELD: &str = "file";
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ImageLoaderError {
    #[error("Failed to read uploaded file: {0}")]
    Read(#[from] MultipartError),
    #[error("Uploaded file {0:?} is empty")]
    EmptyFile(String),
    #[error("Not a data URL")]
    NotADataUrl,
    #[error("Data URL payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

/// A file picked by the user.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }
}

pub struct ImageLoader;

impl ImageLoader {
    /// Reads the `file` field of an upload form.
    ///
    /// Returns `Ok(None)` when the form was submitted without a file chosen.
    pub async fn read_multipart(
        multipart: &mut Multipart,
    ) -> Result<Option<UploadedFile>, ImageLoaderError> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(FILE_FIELD) {
                continue;
            }

            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;

            if file_name.is_empty() && bytes.is_empty() {
                return Ok(None);
            }
            return Ok(Some(UploadedFile::new(file_name, content_type, bytes)));
        }
        Ok(None)
    }

    /// Encodes the file as a `data:` URL usable directly as an image source.
    pub fn to_data_url(file: &UploadedFile) -> Result<String, ImageLoaderError> {
        if file.bytes.is_empty() {
            return Err(ImageLoaderError::EmptyFile(file.file_name.clone()));
        }

        let mime = Self::mime_type(file);
        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&file.bytes)))
    }

    fn mime_type(file: &UploadedFile) -> String {
        match file.content_type.as_deref().and_then(media_type_essence) {
            Some(declared) if declared != FALLBACK_MIME => declared,
            _ => image::guess_format(&file.bytes)
                .map(|format| format.to_mime_type().to_string())
                .unwrap_or_else(|_| FALLBACK_MIME.to_string()),
        }
    }
}

/// `type/subtype` of a content type with parameters dropped, lowercased.
/// `None` unless both parts are non-empty tokens.
fn media_type_essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    let is_token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    if is_token(kind) && is_token(subtype) {
        Some(essence)
    } else {
        None
    }
}

/// Splits a base64 `data:` URL into its mime type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), ImageLoaderError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or(ImageLoaderError::NotADataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(ImageLoaderError::NotADataUrl)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(ImageLoaderError::NotADataUrl)?;

    Ok((mime.to_string(), STANDARD.decode(payload)?))
}
