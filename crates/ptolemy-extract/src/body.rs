//! Request body parsing by content type.

use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::error::{ExtractionError, ExtractionResult, ExtractionSource};
use crate::form::parse_urlencoded;
use crate::multipart::{read_multipart, MultipartConfig};

/// How a body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// JSON, also used when the content type is absent or unknown.
    Json,
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/form-data`
    Multipart,
}

impl BodyKind {
    /// Picks the decoder for a `Content-Type` value.
    ///
    /// ```rust
    /// use ptolemy_extract::BodyKind;
    ///
    /// assert_eq!(BodyKind::detect(None), BodyKind::Json);
    /// assert_eq!(
    ///     BodyKind::detect(Some("application/x-www-form-urlencoded; charset=utf-8")),
    ///     BodyKind::UrlEncoded
    /// );
    /// assert_eq!(BodyKind::detect(Some("text/plain")), BodyKind::Json);
    /// ```
    #[must_use]
    pub fn detect(content_type: Option<&str>) -> Self {
        let Some(mime) = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok()) else {
            return Self::Json;
        };
        if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
            Self::UrlEncoded
        } else if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
            Self::Multipart
        } else {
            Self::Json
        }
    }

    /// Returns `true` for the two form encodings.
    #[must_use]
    pub const fn is_form(self) -> bool {
        matches!(self, Self::UrlEncoded | Self::Multipart)
    }
}

/// A decoded body.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Decoder that produced it.
    pub kind: BodyKind,
    /// Body content. Form bodies give an object of strings.
    pub fields: Json,
    /// Uploaded files, multipart only.
    pub files: IndexMap<String, Bytes>,
}

impl Payload {
    /// An empty mapping.
    #[must_use]
    pub fn empty(kind: BodyKind) -> Self {
        Self {
            kind,
            fields: Json::Object(Map::new()),
            files: IndexMap::new(),
        }
    }

    /// Text field by name, for form bodies.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Json::as_str)
    }
}

/// Decodes a body according to its content type.
///
/// An empty body decodes to an empty mapping whatever its type.
pub async fn read_payload(
    content_type: Option<&str>,
    body: Bytes,
    multipart: &MultipartConfig,
) -> ExtractionResult<Payload> {
    let kind = BodyKind::detect(content_type);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::empty(kind));
    }

    match kind {
        BodyKind::Json => {
            let fields = serde_json::from_slice(&body)
                .map_err(|e| ExtractionError::malformed(ExtractionSource::Body, e))?;
            Ok(Payload {
                kind,
                fields,
                files: IndexMap::new(),
            })
        }
        BodyKind::UrlEncoded => Ok(Payload {
            kind,
            fields: Json::Object(parse_urlencoded(&body, ExtractionSource::Body)?),
            files: IndexMap::new(),
        }),
        BodyKind::Multipart => {
            let form = read_multipart(content_type.unwrap_or_default(), body, multipart).await?;
            Ok(Payload {
                kind,
                fields: Json::Object(form.fields),
                files: form.files,
            })
        }
    }
}
