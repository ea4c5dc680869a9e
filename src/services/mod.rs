pub mod catalog_service;
pub mod catalog_store;
pub mod cleanup_queue;
pub mod image_store;
pub mod image_url_service;
pub mod memory_store;

pub use catalog_service::{CatalogService, DeleteOutcome};
pub use catalog_store::{CatalogStore, PgCatalogStore};
pub use cleanup_queue::ImageCleanupQueue;
pub use image_store::{ImageStore, S3ImageStore};
pub use memory_store::{MemoryCatalogStore, MemoryImageStore};
