//! Backing driver implementations.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
