//! Built-in resource accessors.

pub mod local;
pub mod memory;

pub use local::LocalResource;
pub use memory::MemoryResource;
