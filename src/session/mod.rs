pub mod memory;
pub mod retrieve;

pub use memory::{MemorySession, MemoryStores};
pub use retrieve::{RETRIEVED_HEADER, format_retrieved, prompt_keywords};
