//! heaptap-core: plumbing shared by the heaptap extractor.
//!
//! - `storage/` - Multi-cloud storage abstraction (S3, GCS, Azure, local)
//! - `retry` - Bounded exponential backoff with jitter
//! - `config/` - YAML loading with environment variable interpolation
//! - `metrics/` - `emit!` macro and internal metric events
//! - `signal` - Signal handling for graceful shutdown
//! - `tracing` - Subscriber setup for the CLI
//! - `error` - Storage and configuration error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod signal;
pub mod storage;
pub mod tracing;

pub use error::{ConfigError, StorageError};
pub use retry::{RetryPolicy, random_jitter, retry_with_backoff};
pub use signal::{shutdown_signal, shutdown_token};
pub use storage::{StorageProvider, StorageProviderRef};
pub use self::tracing::init_tracing;
