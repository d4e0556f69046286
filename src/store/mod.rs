//! Build state storage.
//!
//! `BuildStore` is the repository the orchestrator talks to. `FileStore`
//! backs it with the project's markdown files; `MemoryStore` keeps
//! everything in memory.

mod fs;
mod memory;
mod traits;

pub use fs::{FileStore, StoreLayout};
pub use memory::MemoryStore;
pub use traits::BuildStore;
