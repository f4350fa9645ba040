pub mod events;
pub mod id_generator;
pub mod index;
pub mod lifecycle;
pub mod manager;
pub mod model;

pub use id_generator::IdGenerator;
pub use index::ActiveIndex;
pub use lifecycle::{Completion, CompletionHook, LifecycleManager};
pub use manager::AuctionManager;
