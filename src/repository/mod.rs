//! # Repositories
//!
//! Narrow persistence interfaces the orchestration core reads and writes through,
//! with in-memory implementations and (feature `postgres`) PostgreSQL-backed
//! execution and timeline stores.

pub mod errors;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use errors::{RepositoryError, RepositoryResult};
pub use in_memory::{
    InMemoryCompanyRepository, InMemoryDealRepository, InMemoryExecutionRepository,
    InMemoryFindingsRepository, InMemoryStores, InMemoryTimelineRepository,
};
#[cfg(feature = "postgres")]
pub use postgres::{PgExecutionRepository, PgTimelineRepository};
pub use traits::{
    CompanyRepository, DealRepository, ExecutionRepository, FindingsRepository, RepositorySet,
    TimelineRepository,
};
