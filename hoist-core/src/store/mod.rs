pub mod fs;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

pub use fs::FsObjectStore;

/// Machine-checkable failure category, the only thing the retry policy
/// looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Timeout,
    Throttled,
    NotFound,
    AccessDenied,
    Unknown,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("store error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Timeout(_) => StoreErrorKind::Timeout,
            StoreError::Throttled(_) => StoreErrorKind::Throttled,
            StoreError::NotFound(_) => StoreErrorKind::NotFound,
            StoreError::AccessDenied(_) => StoreErrorKind::AccessDenied,
            StoreError::Unknown(_) => StoreErrorKind::Unknown,
        }
    }
}

/// The content stream handed to a store for one PUT attempt.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Capability surface the engine needs from an object store.
///
/// Implementations must make `put_object` independently retryable: putting
/// the same key with the same content twice is safe (idempotent PUT). The
/// engine assumes nothing else about the transport.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: ByteStream,
        size_bytes: u64,
    ) -> Result<(), StoreError>;
}
