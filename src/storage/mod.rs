//! Storage layer: the storer contract, its tuning knobs, and the SQLite
//! realization.

pub mod sqlite;

use crate::error::DirectoryError;
use crate::model::types::Entity;
use std::time::Duration;

// Column names shared by the schema, the row mappers, and the searcher
// registry's indexed expressions.
pub const ENTITY_ID_COL: &str = "entity_id";
pub const LAST_NAME_COL: &str = "last_name";
pub const FIRST_NAME_COL: &str = "first_name";
pub const MIDDLE_NAME_COL: &str = "middle_name";
pub const SUFFIX_COL: &str = "suffix";
pub const BIRTHDATE_COL: &str = "birthdate";
pub const NAME_COL: &str = "name";

pub const MIN_SEARCH_QUERY_LEN: usize = 4;
pub const MAX_SEARCH_QUERY_LEN: usize = 32;
pub const MIN_SEARCH_LIMIT: usize = 1;
pub const MAX_SEARCH_LIMIT: usize = 8;

/// Stores and retrieves entities.
pub trait Storer: Send + Sync {
    /// Inserts a new or updates an existing entity (keyed on `entity_id`)
    /// and returns the entity ID.
    fn put_entity(&self, entity: &Entity) -> Result<String, DirectoryError>;

    /// Retrieves the entity with the given ID.
    fn get_entity(&self, entity_id: &str) -> Result<Entity, DirectoryError>;

    /// Finds up to `limit` entities matching `query`, most similar first.
    fn search_entity(&self, query: &str, limit: usize) -> Result<Vec<Entity>, DirectoryError>;
}

/// Per-operation store deadlines.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub put_timeout: Duration,
    pub get_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            put_timeout: Duration::from_secs(2),
            get_timeout: Duration::from_secs(2),
            search_timeout: Duration::from_secs(2),
        }
    }
}

impl Parameters {
    /// Defaults with `ENTITY_DIRECTORY_{PUT,GET,SEARCH}_TIMEOUT_MS`
    /// overrides applied.
    pub fn from_env() -> Self {
        let mut params = Self::default();
        if let Some(ms) = env_millis("ENTITY_DIRECTORY_PUT_TIMEOUT_MS") {
            params.put_timeout = ms;
        }
        if let Some(ms) = env_millis("ENTITY_DIRECTORY_GET_TIMEOUT_MS") {
            params.get_timeout = ms;
        }
        if let Some(ms) = env_millis("ENTITY_DIRECTORY_SEARCH_TIMEOUT_MS") {
            params.search_timeout = ms;
        }
        params
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

/// Gates a search request before any store work. Query length is measured
/// in code points of the raw text; no normalization is applied.
pub fn validate_search(query: &str, limit: usize) -> Result<(), DirectoryError> {
    let len = query.chars().count();
    if len < MIN_SEARCH_QUERY_LEN {
        return Err(DirectoryError::SearchQueryTooShort);
    }
    if len > MAX_SEARCH_QUERY_LEN {
        return Err(DirectoryError::SearchQueryTooLong);
    }
    if limit < MIN_SEARCH_LIMIT {
        return Err(DirectoryError::SearchLimitTooSmall);
    }
    if limit > MAX_SEARCH_LIMIT {
        return Err(DirectoryError::SearchLimitTooLarge);
    }
    Ok(())
}
