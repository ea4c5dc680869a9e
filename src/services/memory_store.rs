//! In-process stores backing the `memory` catalog backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    error::{ImageError, StoreError},
    models::{ImagePayload, ProductFields, ProductPatch, ProductRecord, image_key},
    services::{
        catalog_store::{CatalogStore, decode_records, generate_document_id},
        image_store::ImageStore,
    },
};

/// Document collection kept in memory. Documents are plain JSON objects so
/// patches merge field by field, as in the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    documents: RwLock<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored fields of document `id`.
    pub fn document(&self, id: &str) -> Option<Map<String, Value>> {
        self.documents.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn list_all(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let documents: Vec<(String, Value)> = self
            .documents
            .read()
            .iter()
            .map(|(id, fields)| (id.clone(), Value::Object(fields.clone())))
            .collect();

        let mut records = decode_records(documents);
        records.sort_by(|a, b| a.nombre.cmp(&b.nombre).then_with(|| a.id.cmp(&b.id)));

        Ok(records)
    }

    async fn insert(&self, fields: &ProductFields) -> Result<String, StoreError> {
        let id = generate_document_id();

        self.documents
            .write()
            .insert(id.clone(), to_object(fields)?);

        Ok(id)
    }

    async fn patch(&self, id: &str, patch: &ProductPatch) -> Result<(), StoreError> {
        let fields = to_object(patch)?;

        let mut documents = self.documents.write();
        let document = documents.get_mut(id).ok_or(StoreError::NotFound)?;
        document.extend(fields);

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.documents.write().remove(id).is_some())
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[derive(Debug, Clone)]
struct StoredImage {
    payload: ImagePayload,
}

/// Object store kept in memory. Download URLs are `{url_base}/{key}`.
#[derive(Debug)]
pub struct MemoryImageStore {
    url_base: String,
    objects: RwLock<HashMap<String, StoredImage>>,
}

impl MemoryImageStore {
    pub fn new(url_base: impl Into<String>) -> Self {
        Self {
            url_base: url_base.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.read().contains_key(&image_key(id))
    }

    pub fn object_len(&self, id: &str) -> Option<usize> {
        self.objects
            .read()
            .get(&image_key(id))
            .map(|image| image.payload.len())
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, id: &str, payload: ImagePayload) -> Result<(), ImageError> {
        self.objects
            .write()
            .insert(image_key(id), StoredImage { payload });

        Ok(())
    }

    async fn resolve_url(&self, id: &str) -> Result<Option<String>, ImageError> {
        let key = image_key(id);

        if !self.objects.read().contains_key(&key) {
            return Ok(None);
        }

        Ok(Some(format!("{}/{}", self.url_base, key)))
    }

    async fn remove(&self, id: &str) -> Result<(), ImageError> {
        self.objects
            .write()
            .remove(&image_key(id))
            .map(|_| ())
            .ok_or(ImageError::NotFound)
    }
}
