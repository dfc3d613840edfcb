pub mod mock;
pub mod observability;
pub mod repositories;

pub use repositories::InMemoryGenerationStore;
