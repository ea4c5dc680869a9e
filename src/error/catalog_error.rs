use std::fmt;

use thiserror::Error;

/// Rejected input, raised before any remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Todos los campos son obligatorios")]
    MissingFields,

    #[error("El precio debe ser un número válido")]
    InvalidPrice,
}

/// Failure of the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    #[error("document store query failed")]
    Database(#[from] sqlx::Error),

    #[error("stored document could not be encoded")]
    Encoding(#[from] serde_json::Error),
}

/// Failure of the object store.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image object not found")]
    NotFound,

    #[error("object store request failed: {0}")]
    Backend(String),

    #[error("download URL could not be signed: {0}")]
    Presign(String),
}

impl ImageError {
    pub fn backend(err: impl fmt::Display) -> Self {
        ImageError::Backend(err.to_string())
    }
}

/// Step of the create flow at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Upload,
    ResolveUrl,
    Patch,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateStage::Upload => write!(f, "image upload"),
            CreateStage::ResolveUrl => write!(f, "download URL resolution"),
            CreateStage::Patch => write!(f, "image metadata update"),
        }
    }
}

/// Outcome of a catalog operation that did not succeed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("product not found")]
    NotFound,

    #[error("document store failure")]
    Store(#[source] StoreError),

    #[error("object store failure")]
    Image(#[source] ImageError),

    #[error("product creation failed during {stage} (rolled back: {rolled_back})")]
    CreateAborted {
        stage: CreateStage,
        rolled_back: bool,
        #[source]
        source: Box<CatalogError>,
    },
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CatalogError::NotFound,
            other => CatalogError::Store(other),
        }
    }
}

impl From<ImageError> for CatalogError {
    fn from(err: ImageError) -> Self {
        CatalogError::Image(err)
    }
}
