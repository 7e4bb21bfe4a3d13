// CLI command implementations

pub mod index;
pub mod languages;
pub mod query;
pub mod serve;
pub mod show;
pub mod stats;

use anyhow::{Context, Result};

use sourceindex::config::Config;
use sourceindex::index::db::{IndexDatabase, StoreOptions};

/// Open the configured index database
pub fn open_database(config: &Config) -> Result<IndexDatabase> {
    IndexDatabase::open(&config.store.database, StoreOptions::from(&config.store))
        .with_context(|| format!("Failed to open index {}", config.store.database.display()))
}
