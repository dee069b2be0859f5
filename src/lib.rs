//! Road roughness tracking: Earth-frame vertical acceleration from phone
//! sensors, GPS segmentation, endpoint privacy blackout and trip summaries.

pub mod analytics;
pub mod batcher;
pub mod config;
pub mod error;
pub mod export;
pub mod geodesy;
pub mod map;
pub mod normalizer;
pub mod orientation;
pub mod privacy;
pub mod segments;
pub mod sensors;
pub mod session;
pub mod storage;
pub mod summary;
pub mod types;
pub mod worker;

pub use analytics::{ClosedTrip, TripAnalytics};
pub use batcher::{BatchSink, SampleBatcher};
pub use config::TrackerConfig;
pub use error::{TResult, TrackerError};
pub use orientation::{OrientationEstimator, OrientationMode, RotationState};
pub use privacy::PrivacyRedactor;
pub use segments::SegmentBuilder;
pub use session::{SessionState, TrackingSession};
pub use storage::{MemoryStore, Storage};
pub use summary::{TripSummarizer, TripSummary};
pub use worker::{TripWorker, WorkerHandle};
