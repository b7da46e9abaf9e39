pub mod file_cache_storage;
pub mod memory_cache_storage;

pub use file_cache_storage::FileCacheStorage;
pub use memory_cache_storage::MemoryCacheStorage;
