pub mod config;
pub mod generate;
pub mod plan;
pub mod providers;
pub mod types;
pub mod usage;
