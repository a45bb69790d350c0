pub mod client;
pub mod guarded;
pub mod memory;
pub mod valkey;

pub use client::{CacheClient, CacheError, CacheResult, ttl_seconds};
pub use guarded::GuardedCache;
pub use memory::MemoryCache;
pub use valkey::ValkeyClient;
