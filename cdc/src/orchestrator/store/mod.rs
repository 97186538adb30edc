pub mod base;
pub mod memory;

pub use base::*;
pub use memory::MemoryStateStore;
