//! Keeps product records and their images consistent across the document store
//! and the object store.
//!
//! Create and delete span both backends without a shared transaction, so both
//! flows compensate on partial failure: a create that cannot attach its image
//! removes what it wrote, and a delete whose image removal fails hands the key
//! to the [`ImageCleanupQueue`].

use std::{fmt, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::CatalogConfig,
    error::{CatalogError, CreateStage, ImageError},
    models::{
        ImagePayload, NewProduct, Product, ProductPatch, ProductRecord, ProductUpdate, image_key,
    },
    services::{
        catalog_store::CatalogStore,
        cleanup_queue::{CleanupReport, ImageCleanupQueue, spawn_cleanup_worker},
        image_store::ImageStore,
    },
    utils::{
        search::filter_products,
        validation::{validate_image, validate_new_product, validate_update},
    },
};

/// What happened to the image of a deleted product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    ImageMissing,
    CleanupQueued,
}

impl DeleteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteOutcome::Removed => "removed",
            DeleteOutcome::ImageMissing => "missing",
            DeleteOutcome::CleanupQueued => "cleanup_queued",
        }
    }
}

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    images: Arc<dyn ImageStore>,
    cleanup: Arc<ImageCleanupQueue>,
    upload_attempts: u32,
    revision: watch::Sender<u64>,
}

impl fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogService")
            .field("upload_attempts", &self.upload_attempts)
            .field("pending_cleanups", &self.cleanup.len())
            .field("revision", &*self.revision.borrow())
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        images: Arc<dyn ImageStore>,
        config: &CatalogConfig,
    ) -> Self {
        let (revision, _) = watch::channel(0);

        Self {
            store,
            images,
            cleanup: Arc::new(ImageCleanupQueue::new(config.cleanup_max_attempts)),
            upload_attempts: config.upload_attempts.max(1),
            revision,
        }
    }

    /// Every product ordered by name, each with its image URL resolved.
    /// Resolutions run concurrently; a record whose image is missing or cannot
    /// be resolved gets `None` without affecting the others.
    pub async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let records = self.store.list_all().await?;

        let products =
            join_all(records.into_iter().map(|record| self.resolve_product(record))).await;

        Ok(products)
    }

    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, CatalogError> {
        let products = self.list_products().await?;

        Ok(filter_products(products, query))
    }

    /// Insert the record, upload its image, then attach the image key and URL.
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let (fields, image) = validate_new_product(product)?;

        let id = self.store.insert(&fields).await?;
        tracing::debug!("Inserted product record {}", id);

        if let Err(e) = self.upload_with_retry(&id, image).await {
            let rolled_back = self.discard_record(&id).await;

            return Err(CatalogError::CreateAborted {
                stage: CreateStage::Upload,
                rolled_back,
                source: Box::new(e.into()),
            });
        }

        let url = match self.images.resolve_url(&id).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                return Err(self
                    .abort_after_upload(&id, CreateStage::ResolveUrl, ImageError::NotFound.into())
                    .await);
            }
            Err(e) => {
                return Err(self
                    .abort_after_upload(&id, CreateStage::ResolveUrl, e.into())
                    .await);
            }
        };

        let key = image_key(&id);

        if let Err(e) = self
            .store
            .patch(&id, &ProductPatch::image(key.clone(), url.clone()))
            .await
        {
            return Err(self
                .abort_after_upload(&id, CreateStage::Patch, e.into())
                .await);
        }

        tracing::info!("Created product {}", id);
        self.bump_revision();

        Ok(Product {
            id,
            nombre: fields.nombre,
            descripcion: fields.descripcion,
            precio: fields.precio,
            imagen: Some(key),
            imagen_url: Some(url),
        })
    }

    /// Overwrites `nombre`, `descripcion` and `precio`. The image is untouched.
    pub async fn update_product(
        &self,
        id: &str,
        update: ProductUpdate,
    ) -> Result<(), CatalogError> {
        let fields = validate_update(&update)?;

        self.store.patch(id, &fields.into()).await?;

        tracing::info!("Updated product {}", id);
        self.bump_revision();

        Ok(())
    }

    /// Uploads a new image over the current one and refreshes the stored URL.
    /// Returns the new download URL.
    pub async fn replace_image(
        &self,
        id: &str,
        image: ImagePayload,
    ) -> Result<String, CatalogError> {
        let image = validate_image(image)?;

        self.upload_with_retry(id, image).await?;

        let url = self
            .images
            .resolve_url(id)
            .await?
            .ok_or(CatalogError::Image(ImageError::NotFound))?;

        if let Err(e) = self
            .store
            .patch(id, &ProductPatch::image(image_key(id), url.clone()))
            .await
        {
            let err = CatalogError::from(e);

            if matches!(err, CatalogError::NotFound) {
                tracing::warn!("Image uploaded for unknown product {}, removing it", id);
                self.discard_image(id).await;
            }

            return Err(err);
        }

        tracing::info!("Replaced image of product {}", id);
        self.bump_revision();

        Ok(url)
    }

    /// Removes the record first, then its image. A failed image removal does
    /// not fail the delete; the key is queued for cleanup instead.
    pub async fn delete_product(&self, id: &str) -> Result<DeleteOutcome, CatalogError> {
        let record_removed = self.store.remove(id).await?;

        if record_removed {
            self.bump_revision();
        } else {
            tracing::debug!("Product {} was not in the catalog", id);
        }

        let outcome = match self.images.remove(id).await {
            Ok(()) => DeleteOutcome::Removed,
            Err(ImageError::NotFound) => {
                tracing::info!("Product {} had no image to remove", id);
                DeleteOutcome::ImageMissing
            }
            Err(e) => {
                tracing::warn!("Failed to remove image of deleted product {}: {}", id, e);
                self.cleanup.enqueue(id);
                DeleteOutcome::CleanupQueued
            }
        };

        tracing::info!("Deleted product {} (image {})", id, outcome.as_str());

        Ok(outcome)
    }

    /// Runs one last cleanup pass. Whatever is still queued afterwards is lost
    /// with the process, so it is logged by product id.
    pub async fn flush_cleanup(&self) -> CleanupReport {
        if self.cleanup.is_empty() {
            return CleanupReport::default();
        }

        let report = self.cleanup.run_once(self.images.as_ref()).await;
        let left = self.cleanup.pending_ids();

        if !left.is_empty() {
            tracing::error!(
                "{} orphan images left behind at shutdown: {}",
                left.len(),
                left.join(", ")
            );
        }

        report
    }

    pub async fn check_health(&self) -> Result<(), CatalogError> {
        self.store.check_health().await?;
        Ok(())
    }

    /// Current catalog revision. Bumped after every successful mutation.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receives the revision every time the catalog changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn cleanup_queue(&self) -> &ImageCleanupQueue {
        &self.cleanup
    }

    pub fn spawn_cleanup_worker(&self, every: Duration) -> JoinHandle<()> {
        spawn_cleanup_worker(self.cleanup.clone(), self.images.clone(), every)
    }

    async fn resolve_product(&self, record: ProductRecord) -> Product {
        let url = match self.images.resolve_url(&record.id).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                tracing::debug!("No image found for product {}", record.id);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to resolve image for product {}: {}", record.id, e);
                None
            }
        };

        record.with_image_url(url)
    }

    async fn upload_with_retry(&self, id: &str, image: ImagePayload) -> Result<(), ImageError> {
        let mut attempt = 1;

        loop {
            match self.images.upload(id, image.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.upload_attempts => {
                    tracing::warn!("Image upload for {} failed (attempt {}): {}", id, attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn abort_after_upload(
        &self,
        id: &str,
        stage: CreateStage,
        source: CatalogError,
    ) -> CatalogError {
        self.discard_image(id).await;
        let rolled_back = self.discard_record(id).await;

        CatalogError::CreateAborted {
            stage,
            rolled_back,
            source: Box::new(source),
        }
    }

    async fn discard_image(&self, id: &str) {
        match self.images.remove(id).await {
            Ok(()) | Err(ImageError::NotFound) => {}
            Err(e) => {
                tracing::warn!("Failed to remove image {}: {}", image_key(id), e);
                self.cleanup.enqueue(id);
            }
        }
    }

    /// Returns whether the record is gone.
    async fn discard_record(&self, id: &str) -> bool {
        match self.store.remove(id).await {
            Ok(_) => {
                tracing::warn!("Rolled back product record {}", id);
                true
            }
            Err(e) => {
                tracing::error!("Orphan product record {} left behind: {}", id, e);
                false
            }
        }
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use testresult::TestResult;
    use tokio::sync::Notify;

    use crate::{
        error::{StoreError, ValidationError},
        models::ProductFields,
        services::{
            catalog_store::MockCatalogStore,
            image_store::MockImageStore,
            memory_store::{MemoryCatalogStore, MemoryImageStore},
        },
    };

    use super::*;

    fn config() -> CatalogConfig {
        CatalogConfig {
            upload_attempts: 2,
            cleanup_max_attempts: 3,
            ..CatalogConfig::default()
        }
    }

    fn service(
        store: impl CatalogStore + 'static,
        images: impl ImageStore + 'static,
    ) -> CatalogService {
        CatalogService::new(Arc::new(store), Arc::new(images), &config())
    }

    fn memory_service() -> (CatalogService, Arc<MemoryCatalogStore>, Arc<MemoryImageStore>) {
        let store = Arc::new(MemoryCatalogStore::new());
        let images = Arc::new(MemoryImageStore::new("memory://bucket"));
        let service = CatalogService::new(store.clone(), images.clone(), &config());

        (service, store, images)
    }

    fn new_product(nombre: &str, descripcion: &str, precio: &str) -> NewProduct {
        NewProduct {
            nombre: nombre.to_string(),
            descripcion: descripcion.to_string(),
            precio: precio.to_string(),
            imagen: Some(ImagePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], None)),
        }
    }

    fn record(id: &str, nombre: &str) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            nombre: nombre.to_string(),
            descripcion: "desc".to_string(),
            precio: "10".to_string(),
            imagen: Some(image_key(id)),
        }
    }

    #[tokio::test]
    async fn create_with_missing_field_makes_no_remote_call() {
        let mut store = MockCatalogStore::new();
        store.expect_insert().never();
        store.expect_patch().never();

        let mut images = MockImageStore::new();
        images.expect_upload().never();

        let service = service(store, images);

        let result = service
            .create_product(NewProduct {
                imagen: None,
                ..new_product("Elote", "Con queso", "35")
            })
            .await;

        assert!(
            matches!(result, Err(CatalogError::Validation(ValidationError::MissingFields))),
            "got {result:?}"
        );
        assert_eq!(service.revision(), 0);
    }

    #[tokio::test]
    async fn create_with_non_numeric_price_is_rejected() {
        let mut store = MockCatalogStore::new();
        store.expect_insert().never();

        let service = service(store, MockImageStore::new());

        let result = service
            .create_product(new_product("Elote", "Con queso", "abc"))
            .await;

        assert!(
            matches!(result, Err(CatalogError::Validation(ValidationError::InvalidPrice))),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn create_writes_record_image_and_patch() -> TestResult {
        let (service, store, images) = memory_service();

        let product = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        let document = store.document(&product.id).ok_or("document missing")?;
        let expected_key = format!("{}.jpg", product.id);

        assert_eq!(store.len(), 1);
        assert_eq!(images.len(), 1);
        assert!(images.contains(&product.id));
        assert_eq!(document.get("nombre"), Some(&"Elote".into()));
        assert_eq!(document.get("descripcion"), Some(&"Con queso".into()));
        assert_eq!(document.get("precio"), Some(&"35".into()));
        assert_eq!(document.get("imagen"), Some(&expected_key.clone().into()));
        assert_eq!(
            document.get("imagenUrl"),
            Some(&format!("memory://bucket/{expected_key}").into())
        );
        assert_eq!(product.imagen.as_deref(), Some(expected_key.as_str()));
        assert_eq!(service.revision(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn create_retries_upload_once_then_succeeds() -> TestResult {
        let mut store = MockCatalogStore::new();
        store
            .expect_insert()
            .once()
            .returning(|_| Ok("p1".to_string()));
        store
            .expect_patch()
            .once()
            .withf(|id, patch| id == "p1" && patch.imagen.as_deref() == Some("p1.jpg"))
            .returning(|_, _| Ok(()));
        store.expect_remove().never();

        let mut images = MockImageStore::new();
        let mut failures = 1;
        images.expect_upload().times(2).returning(move |_, _| {
            if failures > 0 {
                failures -= 1;
                return Err(ImageError::backend("reset"));
            }
            Ok(())
        });
        images
            .expect_resolve_url()
            .once()
            .returning(|_| Ok(Some("https://img/p1.jpg".to_string())));

        let product = service(store, images)
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        assert_eq!(product.imagen_url.as_deref(), Some("https://img/p1.jpg"));

        Ok(())
    }

    #[tokio::test]
    async fn failed_upload_rolls_back_the_record() {
        let mut store = MockCatalogStore::new();
        store
            .expect_insert()
            .once()
            .returning(|_| Ok("p1".to_string()));
        store
            .expect_remove()
            .once()
            .withf(|id| id == "p1")
            .returning(|_| Ok(true));
        store.expect_patch().never();

        let mut images = MockImageStore::new();
        images
            .expect_upload()
            .times(2)
            .returning(|_, _| Err(ImageError::backend("bucket unavailable")));
        images.expect_resolve_url().never();

        let service = service(store, images);

        let result = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await;

        assert!(
            matches!(
                result,
                Err(CatalogError::CreateAborted {
                    stage: CreateStage::Upload,
                    rolled_back: true,
                    ..
                })
            ),
            "got {result:?}"
        );
        assert_eq!(service.revision(), 0);
    }

    #[tokio::test]
    async fn failed_patch_removes_image_and_record() {
        let mut store = MockCatalogStore::new();
        store
            .expect_insert()
            .once()
            .returning(|_| Ok("p1".to_string()));
        store
            .expect_patch()
            .once()
            .returning(|_, _| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));
        store.expect_remove().once().returning(|_| Ok(true));

        let mut images = MockImageStore::new();
        images.expect_upload().once().returning(|_, _| Ok(()));
        images
            .expect_resolve_url()
            .once()
            .returning(|_| Ok(Some("https://img/p1.jpg".to_string())));
        images
            .expect_remove()
            .once()
            .withf(|id| id == "p1")
            .returning(|_| Ok(()));

        let service = service(store, images);

        let result = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await;

        assert!(
            matches!(
                result,
                Err(CatalogError::CreateAborted {
                    stage: CreateStage::Patch,
                    rolled_back: true,
                    ..
                })
            ),
            "got {result:?}"
        );
        assert!(service.cleanup_queue().is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_is_reported() {
        let mut store = MockCatalogStore::new();
        store
            .expect_insert()
            .once()
            .returning(|_| Ok("p1".to_string()));
        store
            .expect_remove()
            .once()
            .returning(|_| Err(StoreError::Database(sqlx::Error::PoolClosed)));

        let mut images = MockImageStore::new();
        images
            .expect_upload()
            .times(2)
            .returning(|_, _| Err(ImageError::backend("bucket unavailable")));

        let result = service(store, images)
            .create_product(new_product("Elote", "Con queso", "35"))
            .await;

        assert!(
            matches!(
                result,
                Err(CatalogError::CreateAborted {
                    rolled_back: false,
                    ..
                })
            ),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn listing_tolerates_missing_and_failing_images() -> TestResult {
        let mut store = MockCatalogStore::new();
        store.expect_list_all().once().returning(|| {
            Ok(vec![
                record("a", "Atole"),
                record("b", "Elote"),
                record("c", "Esquite"),
            ])
        });

        let mut images = MockImageStore::new();
        images
            .expect_resolve_url()
            .withf(|id| id == "a")
            .returning(|_| Ok(Some("https://img/a.jpg".to_string())));
        images
            .expect_resolve_url()
            .withf(|id| id == "b")
            .returning(|_| Ok(None));
        images
            .expect_resolve_url()
            .withf(|id| id == "c")
            .returning(|_| Err(ImageError::backend("timeout")));

        let products = service(store, images).list_products().await?;

        let urls: Vec<(&str, Option<&str>)> = products
            .iter()
            .map(|p| (p.id.as_str(), p.imagen_url.as_deref()))
            .collect();

        assert_eq!(
            urls,
            [
                ("a", Some("https://img/a.jpg")),
                ("b", None),
                ("c", None),
            ]
        );

        Ok(())
    }

    /// Resolving "a" blocks until "b" has been resolved, so the listing only
    /// finishes if resolutions overlap.
    struct GatedImageStore {
        gate: Notify,
    }

    #[async_trait]
    impl ImageStore for GatedImageStore {
        async fn upload(&self, _id: &str, _payload: ImagePayload) -> Result<(), ImageError> {
            Ok(())
        }

        async fn resolve_url(&self, id: &str) -> Result<Option<String>, ImageError> {
            match id {
                "a" => self.gate.notified().await,
                _ => self.gate.notify_one(),
            }
            Ok(Some(format!("https://img/{id}.jpg")))
        }

        async fn remove(&self, _id: &str) -> Result<(), ImageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn listing_resolves_images_concurrently() -> TestResult {
        let mut store = MockCatalogStore::new();
        store
            .expect_list_all()
            .returning(|| Ok(vec![record("a", "Atole"), record("b", "Elote")]));

        let service = service(store, GatedImageStore { gate: Notify::new() });

        let products =
            tokio::time::timeout(Duration::from_secs(5), service.list_products()).await??;

        assert_eq!(products.len(), 2);
        assert!(products.iter().all(|p| p.imagen_url.is_some()));

        Ok(())
    }

    #[tokio::test]
    async fn listing_is_sorted_by_name() -> TestResult {
        let (service, _, _) = memory_service();

        for nombre in ["Tamal", "Elote", "Atole"] {
            service.create_product(new_product(nombre, "x", "1")).await?;
        }

        let names: Vec<String> = service
            .list_products()
            .await?
            .into_iter()
            .map(|p| p.nombre)
            .collect();

        assert_eq!(names, ["Atole", "Elote", "Tamal"]);

        Ok(())
    }

    #[tokio::test]
    async fn search_filters_listing() -> TestResult {
        let (service, _, _) = memory_service();

        service
            .create_product(new_product("Elote Clasico", "Mayonesa", "30"))
            .await?;
        service
            .create_product(new_product("Esquite", "En vaso", "35"))
            .await?;

        assert_eq!(service.search_products("clasico").await?.len(), 1);
        assert_eq!(service.search_products("e").await?.len(), 2);
        assert_eq!(service.search_products("VASO").await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_image() -> TestResult {
        let (service, _, _) = memory_service();
        let created = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        service
            .update_product(
                &created.id,
                ProductUpdate {
                    nombre: "Elote Grande".to_string(),
                    descripcion: "Con queso y chile".to_string(),
                    precio: "45".to_string(),
                },
            )
            .await?;

        let products = service.list_products().await?;
        let updated = products.first().ok_or("product missing")?;

        assert_eq!(updated.nombre, "Elote Grande");
        assert_eq!(updated.precio, "45");
        assert_eq!(updated.imagen, created.imagen);
        assert!(updated.imagen_url.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn update_unknown_product_is_not_found() {
        let (service, _, _) = memory_service();

        let result = service
            .update_product(
                "missing",
                ProductUpdate {
                    nombre: "Elote".to_string(),
                    descripcion: "Con queso".to_string(),
                    precio: "35".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(CatalogError::NotFound)), "got {result:?}");
    }

    #[tokio::test]
    async fn update_validates_before_writing() {
        let mut store = MockCatalogStore::new();
        store.expect_patch().never();

        let result = service(store, MockImageStore::new())
            .update_product(
                "p1",
                ProductUpdate {
                    nombre: "Elote".to_string(),
                    descripcion: String::new(),
                    precio: "35".to_string(),
                },
            )
            .await;

        assert!(
            matches!(result, Err(CatalogError::Validation(ValidationError::MissingFields))),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn replace_image_overwrites_object() -> TestResult {
        let (service, _, images) = memory_service();
        let created = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        let url = service
            .replace_image(&created.id, ImagePayload::new(vec![1; 16], None))
            .await?;

        assert_eq!(url, format!("memory://bucket/{}.jpg", created.id));
        assert_eq!(images.len(), 1);
        assert_eq!(images.object_len(&created.id), Some(16));
        assert_eq!(service.revision(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn replace_image_of_unknown_product_leaves_no_object() {
        let (service, _, images) = memory_service();

        let result = service
            .replace_image("missing", ImagePayload::new(vec![1; 4], None))
            .await;

        assert!(matches!(result, Err(CatalogError::NotFound)), "got {result:?}");
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record_and_image() -> TestResult {
        let (service, store, images) = memory_service();
        let kept = service
            .create_product(new_product("Esquite", "En vaso", "30"))
            .await?;
        let doomed = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        let outcome = service.delete_product(&doomed.id).await?;

        assert_eq!(outcome, DeleteOutcome::Removed);
        assert_eq!(store.len(), 1);
        assert!(!images.contains(&doomed.id));

        let ids: Vec<String> = service
            .list_products()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(ids, [kept.id]);

        Ok(())
    }

    #[tokio::test]
    async fn delete_without_image_reports_missing() -> TestResult {
        let (service, store, _) = memory_service();
        let id = store
            .insert(&ProductFields {
                nombre: "Elote".to_string(),
                descripcion: "Con queso".to_string(),
                precio: "35".to_string(),
            })
            .await?;

        assert_eq!(service.delete_product(&id).await?, DeleteOutcome::ImageMissing);
        assert!(service.cleanup_queue().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn failed_image_removal_is_queued_for_cleanup() -> TestResult {
        let mut store = MockCatalogStore::new();
        store.expect_remove().once().returning(|_| Ok(true));

        let mut images = MockImageStore::new();
        images
            .expect_remove()
            .once()
            .returning(|_| Err(ImageError::backend("throttled")));

        let service = service(store, images);

        let outcome = service.delete_product("p1").await?;

        assert_eq!(outcome, DeleteOutcome::CleanupQueued);
        assert_eq!(service.cleanup_queue().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn deleting_unknown_product_keeps_revision() -> TestResult {
        let (service, _, _) = memory_service();
        let changes = service.subscribe();

        let outcome = service.delete_product("missing").await?;

        assert_eq!(outcome, DeleteOutcome::ImageMissing);
        assert_eq!(service.revision(), 0);
        assert!(!changes.has_changed()?);

        Ok(())
    }

    #[tokio::test]
    async fn flush_cleanup_retries_queued_images() -> TestResult {
        let mut store = MockCatalogStore::new();
        store.expect_remove().times(2).returning(|_| Ok(true));

        let mut images = MockImageStore::new();
        images
            .expect_remove()
            .withf(|id| id == "p1")
            .times(2)
            .returning({
                let mut calls = 0;
                move |_| {
                    calls += 1;
                    if calls == 1 {
                        Err(ImageError::backend("throttled"))
                    } else {
                        Ok(())
                    }
                }
            });
        images
            .expect_remove()
            .withf(|id| id == "p2")
            .times(2)
            .returning(|_| Err(ImageError::backend("throttled")));

        let service = service(store, images);
        service.delete_product("p1").await?;
        service.delete_product("p2").await?;

        let report = service.flush_cleanup().await;

        assert_eq!(report.removed, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(service.cleanup_queue().pending_ids(), ["p2"]);

        Ok(())
    }

    #[tokio::test]
    async fn flush_cleanup_with_empty_queue_touches_nothing() {
        let mut images = MockImageStore::new();
        images.expect_remove().never();

        let report = service(MockCatalogStore::new(), images).flush_cleanup().await;

        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn failed_record_removal_keeps_image() {
        let mut store = MockCatalogStore::new();
        store
            .expect_remove()
            .once()
            .returning(|_| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let mut images = MockImageStore::new();
        images.expect_remove().never();

        let result = service(store, images).delete_product("p1").await;

        assert!(matches!(result, Err(CatalogError::Store(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn subscribers_see_mutations() -> TestResult {
        let (service, _, _) = memory_service();
        let mut changes = service.subscribe();

        let created = service
            .create_product(new_product("Elote", "Con queso", "35"))
            .await?;

        assert!(changes.has_changed()?);
        assert_eq!(*changes.borrow_and_update(), 1);

        service.delete_product(&created.id).await?;

        changes.changed().await?;
        assert_eq!(*changes.borrow_and_update(), 2);

        Ok(())
    }
}
