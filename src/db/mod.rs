pub mod memory;
pub mod pg;
pub mod pool;
pub mod queries;
pub mod repository;

pub use memory::InMemoryRepository;
pub use pg::PgRepository;
pub use pool::create_pool;
pub use queries::export_to_csv;
pub use repository::{ApplicantScope, CatalogRepository, MatchStore, PersistOutcome};
