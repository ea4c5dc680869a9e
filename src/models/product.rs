use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Extension appended to a product id to form its image object key.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Object-store key of the image belonging to product `id`.
pub fn image_key(id: &str) -> String {
    format!("{}.{}", id, IMAGE_EXTENSION)
}

/// A product as returned to callers, with its image URL resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub nombre: String,
    pub descripcion: String,
    pub precio: String,
    pub imagen: Option<String>,
    #[serde(rename = "imagenUrl")]
    pub imagen_url: Option<String>,
}

/// A product as stored in the document collection. Never carries a download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub id: String,
    pub nombre: String,
    pub descripcion: String,
    pub precio: String,
    pub imagen: Option<String>,
}

impl ProductRecord {
    pub fn from_document(id: impl Into<String>, document: ProductDocument) -> Self {
        Self {
            id: id.into(),
            nombre: document.nombre,
            descripcion: document.descripcion,
            precio: document.precio,
            imagen: document.imagen,
        }
    }

    pub fn with_image_url(self, imagen_url: Option<String>) -> Product {
        Product {
            id: self.id,
            nombre: self.nombre,
            descripcion: self.descripcion,
            precio: self.precio,
            imagen: self.imagen,
            imagen_url,
        }
    }
}

/// Body of a stored document. `imagenUrl` is persisted by writers but ignored on
/// read, since download URLs expire. Other clients write to the same
/// collection, so fields of the wrong type decode as empty instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub descripcion: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub precio: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub imagen: Option<String>,
}

impl ProductDocument {
    /// Fails only when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// The metadata fields written on insert and on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductFields {
    pub nombre: String,
    pub descripcion: String,
    pub precio: String,
}

/// Field-level overwrite of a stored document. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imagen: Option<String>,
    #[serde(rename = "imagenUrl", skip_serializing_if = "Option::is_none")]
    pub imagen_url: Option<String>,
}

impl ProductPatch {
    pub fn image(key: String, url: String) -> Self {
        Self {
            imagen: Some(key),
            imagen_url: Some(url),
            ..Self::default()
        }
    }
}

impl From<ProductFields> for ProductPatch {
    fn from(fields: ProductFields) -> Self {
        Self {
            nombre: Some(fields.nombre),
            descripcion: Some(fields.descripcion),
            precio: Some(fields.precio),
            ..Self::default()
        }
    }
}

/// Binary image content received from a client, before upload.
#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Input of the create flow.
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub nombre: String,
    pub descripcion: String,
    pub precio: String,
    pub imagen: Option<ImagePayload>,
}

/// Input of the update flow. Missing fields deserialize as empty strings so the
/// presence check reports them instead of the JSON extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub precio: String,
}

impl From<ProductUpdate> for ProductFields {
    fn from(update: ProductUpdate) -> Self {
        Self {
            nombre: update.nombre,
            descripcion: update.descripcion,
            precio: update.precio,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: String,
    pub imagen: String,
    #[serde(rename = "imagenUrl")]
    pub imagen_url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub image: &'static str,
}

// Strings pass through and numbers or booleans keep their text. Anything else is
// treated as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_string(deserializer)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}
