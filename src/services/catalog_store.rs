//! Document collection holding product metadata.

use async_trait::async_trait;
use mockall::automock;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    database,
    error::StoreError,
    models::{ProductDocument, ProductFields, ProductPatch, ProductRecord},
    queries::document_queries,
};

#[automock]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every record, ordered by `nombre` ascending.
    async fn list_all(&self) -> Result<Vec<ProductRecord>, StoreError>;

    /// Creates a record and returns its generated id.
    async fn insert(&self, fields: &ProductFields) -> Result<String, StoreError>;

    /// Overwrites the given fields. Fails with [`StoreError::NotFound`] when the
    /// backend has no record with this id.
    async fn patch(&self, id: &str, patch: &ProductPatch) -> Result<(), StoreError>;

    /// Deletes the record. Deleting an unknown id succeeds and returns `false`.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    async fn check_health(&self) -> Result<(), StoreError>;
}

/// Generates a document id the way the collection expects: opaque, unique,
/// URL and object-key safe.
pub fn generate_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Turns raw documents into records, in order. A document that cannot be read
/// as a product is logged and left out.
pub fn decode_records(documents: impl IntoIterator<Item = (String, Value)>) -> Vec<ProductRecord> {
    documents
        .into_iter()
        .filter_map(|(id, data)| match ProductDocument::from_value(data) {
            Ok(document) => Some(ProductRecord::from_document(id, document)),
            Err(e) => {
                tracing::warn!("Skipping unreadable product document {}: {}", id, e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    collection: String,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_all(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let rows = document_queries::list_ordered_by_name(&self.pool, &self.collection).await?;

        Ok(decode_records(rows.into_iter().map(|row| (row.id, row.data.0))))
    }

    async fn insert(&self, fields: &ProductFields) -> Result<String, StoreError> {
        let id = generate_document_id();
        let data = serde_json::to_value(fields)?;

        document_queries::insert(&self.pool, &self.collection, &id, &data).await?;

        tracing::debug!("Inserted document {} into {}", id, self.collection);

        Ok(id)
    }

    async fn patch(&self, id: &str, patch: &ProductPatch) -> Result<(), StoreError> {
        let fields = serde_json::to_value(patch)?;

        let rows = document_queries::patch(&self.pool, &self.collection, id, &fields).await?;

        if rows == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let rows = document_queries::delete(&self.pool, &self.collection, id).await?;

        if rows == 0 {
            tracing::debug!("Document {} was already absent from {}", id, self.collection);
        }

        Ok(rows > 0)
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        database::check_health(&self.pool).await?;
        Ok(())
    }
}
