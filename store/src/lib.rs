pub mod keys;
pub mod memory;
pub mod redis_store;

pub use memory::MemoryCoordStore;
pub use redis_store::RedisCoordStore;
