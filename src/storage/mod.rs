//! Storage layer for the session grant cache.
//!
//! - **Filesystem**: one JSON file per key under the data directory
//! - **Memory**: process-local, for tests and ephemeral sessions

mod filesystem;
mod memory;
mod traits;

pub use filesystem::FilesystemGrantStore;
pub use memory::MemoryGrantStore;
pub use traits::GrantStore;
