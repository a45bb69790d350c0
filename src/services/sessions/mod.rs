pub mod cached;
pub mod manager;
pub mod memory;
pub mod store;
pub mod types;

pub use cached::CacheSessionStore;
pub use manager::SessionManager;
pub use memory::MemorySessionStore;
pub use store::SessionStore;
pub use types::{NewSession, Session, SessionStatus};
