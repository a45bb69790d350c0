pub mod engine;
pub mod graph;
pub mod policy;
pub mod store;

pub use engine::RbacEngine;
pub use policy::{Effect, EffectivePermission, PolicyRule};
pub use store::{MemoryPolicyStore, PolicyStore};
