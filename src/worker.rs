// worker.rs: single-threaded storage worker
//
// One dedicated thread owns the Storage and drains a FIFO job queue, so every
// mutation is serialised and batches land in submission order. The sensor
// thread only ever does a non-blocking send; request/response jobs reply
// through oneshot channels.
//
// Failed batch inserts are parked in a retry queue and retried ahead of every
// later job. While they keep failing, request/response jobs fail with the
// storage error so a trip close never runs over incomplete data.

use std::collections::VecDeque;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::analytics::{ClosedTrip, TripAnalytics};
use crate::batcher::BatchSink;
use crate::error::{TResult, TrackerError};
use crate::export::{self, UploadCleanup, UploadPayload};
use crate::storage::Storage;
use crate::summary::TripSummary;
use crate::types::{SampleBatch, TripId, TripSurface};

type Reply<T> = oneshot::Sender<TResult<T>>;

enum Job {
    Insert(SampleBatch),
    Sync { reply: Reply<()> },
    CloseTrip { trip_id: TripId, radius_m: f64, reply: Reply<ClosedTrip> },
    Summary { trip_id: TripId, reply: Reply<Option<TripSummary>> },
    Trips { reply: Reply<Vec<TripId>> },
    SetSurface { surface: TripSurface, reply: Reply<()> },
    Export { user_id: String, max_trip: TripId, reply: Reply<UploadPayload> },
    DeleteUploaded { max_trip: TripId, reply: Reply<UploadCleanup> },
    DeleteAll { reply: Reply<()> },
    Shutdown,
}

/// Cloneable submission side of the worker queue
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Job::Insert(_) => "Insert",
            Job::Sync { .. } => "Sync",
            Job::CloseTrip { .. } => "CloseTrip",
            Job::Summary { .. } => "Summary",
            Job::Trips { .. } => "Trips",
            Job::SetSurface { .. } => "SetSurface",
            Job::Export { .. } => "Export",
            Job::DeleteUploaded { .. } => "DeleteUploaded",
            Job::DeleteAll { .. } => "DeleteAll",
            Job::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl WorkerHandle {
    fn send(&self, job: Job) -> TResult<()> {
        self.tx.send(job).map_err(|_| TrackerError::WorkerClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Job) -> TResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| TrackerError::WorkerClosed)?
    }

    /// Resolves once every previously submitted batch is stored
    pub async fn sync(&self) -> TResult<()> {
        self.request(|reply| Job::Sync { reply }).await
    }

    pub async fn close_trip(&self, trip_id: TripId, radius_m: f64) -> TResult<ClosedTrip> {
        self.request(|reply| Job::CloseTrip { trip_id, radius_m, reply }).await
    }

    pub async fn summary(&self, trip_id: TripId) -> TResult<Option<TripSummary>> {
        self.request(|reply| Job::Summary { trip_id, reply }).await
    }

    pub async fn trips(&self) -> TResult<Vec<TripId>> {
        self.request(|reply| Job::Trips { reply }).await
    }

    pub async fn set_surface(&self, surface: TripSurface) -> TResult<()> {
        self.request(|reply| Job::SetSurface { surface, reply }).await
    }

    pub async fn export_upload(&self, user_id: &str, max_trip: TripId) -> TResult<UploadPayload> {
        let user_id = user_id.to_string();
        self.request(|reply| Job::Export { user_id, max_trip, reply }).await
    }

    pub async fn delete_uploaded(&self, max_trip: TripId) -> TResult<UploadCleanup> {
        self.request(|reply| Job::DeleteUploaded { max_trip, reply }).await
    }

    pub async fn delete_all(&self) -> TResult<()> {
        self.request(|reply| Job::DeleteAll { reply }).await
    }
}

impl BatchSink for WorkerHandle {
    fn submit(&self, batch: SampleBatch) -> TResult<()> {
        self.send(Job::Insert(batch))
    }
}

pub struct TripWorker<S: Storage + 'static> {
    handle: WorkerHandle,
    thread: Option<JoinHandle<TResult<S>>>,
}

impl<S: Storage + 'static> TripWorker<S> {
    pub fn spawn(storage: S) -> TResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("trip-worker".to_string())
            .spawn(move || WorkerLoop::new(storage).run(rx))
            .map_err(|e| TrackerError::StorageError(format!("failed to start worker: {}", e)))?;
        info!("trip worker started");
        Ok(Self { handle: WorkerHandle { tx }, thread: Some(thread) })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Finish queued jobs, stop the thread and hand the storage back.
    ///
    /// Blocks until the queue ahead of the stop marker is drained. Fails with
    /// `StorageError` if batches are still unsaved after a last retry.
    pub fn shutdown(mut self) -> TResult<S> {
        self.handle.send(Job::Shutdown)?;
        let thread = self.thread.take().ok_or(TrackerError::WorkerClosed)?;
        thread
            .join()
            .map_err(|_| TrackerError::StorageError("worker thread panicked".to_string()))?
    }
}

impl<S: Storage + 'static> Drop for TripWorker<S> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            // Detached: the loop exits once every handle is dropped
            let _ = self.handle.send(Job::Shutdown);
        }
    }
}

struct WorkerLoop<S: Storage> {
    storage: S,
    retry: VecDeque<SampleBatch>,
    jobs_done: u64,
}

impl<S: Storage> WorkerLoop<S> {
    fn new(storage: S) -> Self {
        Self { storage, retry: VecDeque::new(), jobs_done: 0 }
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) -> TResult<S> {
        while let Some(job) = rx.blocking_recv() {
            if matches!(job, Job::Shutdown) {
                break;
            }
            debug!("worker job {:?}", job);
            self.handle(job);
            self.jobs_done += 1;
        }
        if let Err(e) = self.drain_retry() {
            let samples: usize = self.retry.iter().map(SampleBatch::len).sum();
            warn!("worker stopping with {} unsaved batches", self.retry.len());
            return Err(TrackerError::StorageError(format!(
                "{} batches ({} samples) unsaved at shutdown: {}",
                self.retry.len(),
                samples,
                e
            )));
        }
        info!("trip worker stopped after {} jobs", self.jobs_done);
        Ok(self.storage)
    }

    fn drain_retry(&mut self) -> TResult<()> {
        while let Some(batch) = self.retry.front() {
            if let Err(e) = self.storage.insert_batch(batch) {
                error!(
                    "storing {:?} batch of {} failed ({} queued): {}",
                    batch.stream(),
                    batch.len(),
                    self.retry.len(),
                    e
                );
                return Err(e);
            }
            self.retry.pop_front();
        }
        Ok(())
    }

    fn handle(&mut self, job: Job) {
        match job {
            Job::Insert(batch) => {
                self.retry.push_back(batch);
                let _ = self.drain_retry();
            }
            Job::Sync { reply } => {
                let _ = reply.send(self.drain_retry());
            }
            Job::CloseTrip { trip_id, radius_m, reply } => {
                let result = self
                    .drain_retry()
                    .and_then(|_| TripAnalytics::new(&mut self.storage).close_trip(trip_id, radius_m));
                let _ = reply.send(result);
            }
            Job::Summary { trip_id, reply } => {
                let result = self
                    .drain_retry()
                    .and_then(|_| TripAnalytics::new(&mut self.storage).summary(trip_id));
                let _ = reply.send(result);
            }
            Job::Trips { reply } => {
                let result = self.drain_retry().and_then(|_| self.storage.trips());
                let _ = reply.send(result);
            }
            Job::SetSurface { surface, reply } => {
                let result = self
                    .drain_retry()
                    .and_then(|_| TripAnalytics::new(&mut self.storage).set_surface(surface));
                let _ = reply.send(result);
            }
            Job::Export { user_id, max_trip, reply } => {
                let result = self
                    .drain_retry()
                    .and_then(|_| UploadPayload::collect(&self.storage, &user_id, max_trip));
                let _ = reply.send(result);
            }
            Job::DeleteUploaded { max_trip, reply } => {
                let result = self
                    .drain_retry()
                    .and_then(|_| export::delete_uploaded(&mut self.storage, max_trip));
                let _ = reply.send(result);
            }
            Job::DeleteAll { reply } => {
                // Queued samples belong to data being erased
                self.retry.clear();
                let result = TripAnalytics::new(&mut self.storage).delete_all();
                let _ = reply.send(result);
            }
            Job::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, TripFilter};
    use crate::types::{AccelSample, LocationSample, Stream};

    fn fixes(trip_id: TripId, n: usize) -> SampleBatch {
        SampleBatch::Location(
            (0..n)
                .map(|i| LocationSample {
                    timestamp: i as i64 * 60_000,
                    seq: i as u32,
                    latitude: 53.50 + i as f64 * 0.01,
                    longitude: -113.50,
                    trip_id,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_batches_are_stored_in_order() {
        let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
        let handle = worker.handle();
        for i in 0..10 {
            let sample = AccelSample { timestamp: 1_000, seq: 0, x: 0.0, y: 0.0, z: i as f64, trip_id: 1 };
            handle.submit(SampleBatch::Accel(vec![sample])).unwrap();
        }
        handle.sync().await.unwrap();
        let store = worker.shutdown().unwrap();
        // Same key replaced ten times; the last submission wins
        let rows = crate::storage::accel_samples(&store, TripFilter::Only(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].z, 9.0);
    }

    #[tokio::test]
    async fn test_close_and_summary_through_queue() {
        let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
        let handle = worker.handle();
        handle.submit(fixes(3, 4)).unwrap();
        let closed = handle.close_trip(3, 0.0).await.unwrap();
        assert_eq!(closed.segments.len(), 3);
        assert_eq!(handle.trips().await.unwrap(), vec![3]);
        let summary = handle.summary(3).await.unwrap().unwrap();
        assert!((summary.distance_km - 3.336).abs() < 0.01);
        assert!(handle.summary(4).await.unwrap().is_none());
        worker.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_surface_export_and_cleanup() {
        let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
        let handle = worker.handle();
        handle.submit(fixes(1, 4)).unwrap();
        handle.submit(fixes(2, 4)).unwrap();
        handle.set_surface(TripSurface { trip_id: 1, surface: "gravel".into() }).await.unwrap();

        let payload = handle.export_upload("rider", 1).await.unwrap();
        assert_eq!(payload.locations.len(), 4);
        assert_eq!(payload.surfaces.len(), 1);

        let cleanup = handle.delete_uploaded(1).await.unwrap();
        assert_eq!(cleanup.locations_deleted, 4);
        handle.delete_all().await.unwrap();
        let store = worker.shutdown().unwrap();
        assert_eq!(store.count(Stream::Location, TripFilter::Any).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let worker = TripWorker::spawn(MemoryStore::new()).unwrap();
        let handle = worker.handle();
        worker.shutdown().unwrap();
        assert_eq!(handle.submit(fixes(1, 1)), Err(TrackerError::WorkerClosed));
        assert_eq!(handle.trips().await, Err(TrackerError::WorkerClosed));
    }
}
