//! `multipart/form-data` bodies.

use std::io;

use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::error::{ExtractionError, ExtractionResult, ExtractionSource};

/// Default maximum size per field (10 MB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 * 1024 * 1024;

/// Limits applied while reading a multipart body.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Maximum size per field in bytes.
    pub max_field_size: usize,
    /// Maximum number of fields.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: 100,
        }
    }
}

impl MultipartConfig {
    /// Sets the maximum field size.
    #[must_use]
    pub fn max_field_size(mut self, size: usize) -> Self {
        self.max_field_size = size;
        self
    }

    /// Sets the maximum number of fields.
    #[must_use]
    pub fn max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }
}

/// A fully read multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    /// Text fields.
    pub fields: Map<String, Json>,
    /// File fields, as raw bytes.
    pub files: IndexMap<String, Bytes>,
}

/// Reads every part of a multipart body.
///
/// A part with a file name is a file; anything else is a text field.
pub async fn read_multipart(
    content_type: &str,
    body: Bytes,
    config: &MultipartConfig,
) -> ExtractionResult<MultipartForm> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| {
        ExtractionError::malformed(
            ExtractionSource::ContentType,
            "missing or invalid multipart boundary",
        )
    })?;
    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = MultipartForm::default();
    let mut count = 0_usize;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ExtractionError::malformed(ExtractionSource::Body, e))?
    {
        count += 1;
        if count > config.max_fields {
            return Err(ExtractionError::malformed(
                ExtractionSource::Body,
                format!("too many multipart fields (max {})", config.max_fields),
            ));
        }

        let name = field.name().unwrap_or_default().to_string();
        let is_file = field.file_name().is_some();
        let data = field
            .bytes()
            .await
            .map_err(|e| ExtractionError::malformed(ExtractionSource::Form, e))?;
        if data.len() > config.max_field_size {
            return Err(ExtractionError::payload_too_large(config.max_field_size, data.len()));
        }

        if is_file {
            form.files.entry(name).or_insert(data);
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|_| {
                ExtractionError::invalid_type(ExtractionSource::Form, name.as_str(), "not valid UTF-8")
            })?;
            form.fields.entry(name).or_insert(Json::String(text));
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=X-BOUNDARY";

    fn body() -> Bytes {
        Bytes::from_static(
            b"--X-BOUNDARY\r\n\
Content-Disposition: form-data; name=\"label\"\r\n\r\n\
holiday\r\n\
--X-BOUNDARY\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hello\r\n\
--X-BOUNDARY--\r\n",
        )
    }

    #[tokio::test]
    async fn test_fields_and_files() {
        let form = read_multipart(CONTENT_TYPE, body(), &MultipartConfig::default())
            .await
            .unwrap();
        assert_eq!(form.fields["label"], "holiday");
        assert_eq!(form.files["file"], Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_field_limit() {
        let config = MultipartConfig::default().max_fields(1);
        let err = read_multipart(CONTENT_TYPE, body(), &config).await.unwrap_err();
        assert!(err.to_string().contains("too many multipart fields"));
    }

    #[tokio::test]
    async fn test_field_size_limit() {
        let config = MultipartConfig::default().max_field_size(3);
        let err = read_multipart(CONTENT_TYPE, body(), &config).await.unwrap_err();
        assert!(err.to_string().contains("payload too large"));
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let err = read_multipart("multipart/form-data", body(), &MultipartConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.extraction_source(), ExtractionSource::ContentType);
    }
}
