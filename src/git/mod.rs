pub mod backend;
pub mod client;

pub use backend::GitBackend;
pub use client::{GitClient, ResetMode, RevisionRange};
