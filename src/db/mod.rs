pub mod dbsheet;
pub mod memory;
pub mod store;

pub use dbsheet::DbSheet;
pub use memory::MemoryStore;
pub use store::*;
