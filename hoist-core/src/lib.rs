//! Batch object-upload engine.
//!
//! A bounded pool of workers drains a FIFO queue of file-to-object transfer
//! tasks, retrying transient store errors with jittered exponential backoff
//! and reporting every status transition on an ordered event stream. The
//! store itself is a pluggable capability ([`ObjectStoreClient`]); a
//! local-directory implementation is included for tests and offline use.

pub mod config;
pub mod engine;
pub mod models;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use engine::retry::{ErrorClass, RetryDecision, RetryPolicy};
pub use engine::{ShutdownReport, SubmitError, UploadEngine};
pub use models::{TaskEvent, TaskId, TransferRequest, TransferStatus, TransferTask};
pub use store::{ByteStream, FsObjectStore, ObjectStoreClient, StoreError, StoreErrorKind};
