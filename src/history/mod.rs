pub mod emitter;
pub mod store;

pub use emitter::Subscription;
pub use store::HistoryStore;
