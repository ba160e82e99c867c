pub mod backend;
pub mod batch;
pub mod locks;
pub mod memory;
pub mod snapshot;

pub use backend::{LedgerStore, Result, StorageError, Table};
pub use batch::{WriteBatch, WriteOp};
pub use locks::{LockKey, RowGuard, RowLocks};
pub use memory::MemoryBackend;
pub use snapshot::{LedgerSnapshot, SnapshotMetadata};
