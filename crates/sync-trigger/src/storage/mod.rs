//! Storage backends and the sync engine seam.

pub mod backend;
pub mod engine;
pub mod guard;

pub use backend::{
    Backend, BackendDescriptor, BackendError, BackendKind, Credentials, Role, SyncConfig,
};
pub use engine::{S3SyncEngine, SyncEngine, SyncError, SyncOptions, SyncReport};
pub use guard::SyncGuard;
pub use engine::mock;
