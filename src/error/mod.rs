mod app_error;
mod catalog_error;

pub use app_error::AppError;
pub use catalog_error::{CatalogError, CreateStage, ImageError, StoreError, ValidationError};

pub type Result<T> = std::result::Result<T, AppError>;
