pub mod database;
pub mod usage_store;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use usage_store::{ProviderUsageSummary, SqliteUsageSink};
