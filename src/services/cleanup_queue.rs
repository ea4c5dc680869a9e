//! Retry queue for image objects left behind when a product record was deleted
//! but its image removal failed.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{error::ImageError, services::image_store::ImageStore};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCleanup {
    id: String,
    attempts: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub already_gone: usize,
    pub retained: usize,
    pub abandoned: usize,
}

#[derive(Debug)]
pub struct ImageCleanupQueue {
    pending: Mutex<VecDeque<PendingCleanup>>,
    max_attempts: u32,
}

impl ImageCleanupQueue {
    /// `max_attempts` counts the failed removal that caused the enqueue.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queues the image of product `id` for removal. Already queued ids are
    /// not duplicated.
    pub fn enqueue(&self, id: impl Into<String>) {
        let id = id.into();
        let mut pending = self.pending.lock();

        if pending.iter().any(|item| item.id == id) {
            return;
        }

        tracing::warn!("Queued image cleanup for product {}", id);
        pending.push_back(PendingCleanup { id, attempts: 1 });
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Product ids whose images are still waiting for removal.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().iter().map(|item| item.id.clone()).collect()
    }

    /// Tries every queued removal once. Entries that still fail are re-queued
    /// until they reach the attempt limit.
    pub async fn run_once(&self, images: &dyn ImageStore) -> CleanupReport {
        let batch: Vec<PendingCleanup> = self.pending.lock().drain(..).collect();
        let mut report = CleanupReport::default();

        for mut item in batch {
            item.attempts += 1;

            match images.remove(&item.id).await {
                Ok(()) => {
                    tracing::info!("Removed orphan image of product {}", item.id);
                    report.removed += 1;
                }
                Err(ImageError::NotFound) => {
                    report.already_gone += 1;
                }
                Err(e) if item.attempts >= self.max_attempts => {
                    tracing::error!(
                        "Giving up on orphan image of product {} after {} attempts: {}",
                        item.id,
                        item.attempts,
                        e
                    );
                    report.abandoned += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Image cleanup for product {} failed (attempt {}): {}",
                        item.id,
                        item.attempts,
                        e
                    );
                    report.retained += 1;
                    self.requeue(item);
                }
            }
        }

        report
    }

    fn requeue(&self, item: PendingCleanup) {
        let mut pending = self.pending.lock();

        // An enqueue may have raced in while the batch was out.
        if !pending.iter().any(|queued| queued.id == item.id) {
            pending.push_back(item);
        }
    }
}

pub fn spawn_cleanup_worker(
    queue: Arc<ImageCleanupQueue>,
    images: Arc<dyn ImageStore>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if queue.is_empty() {
                continue;
            }

            let report = queue.run_once(images.as_ref()).await;
            tracing::debug!("Image cleanup pass: {:?}", report);
        }
    })
}
