//! Registry of every live filter, keyed by id.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::Filter;
use crate::domain::{FilterId, Timestamp};
use crate::error::{EventError, EventResult};

/// Shared filter registry guarded by a single lock.
pub struct FilterStore {
    max: usize,
    filters: Mutex<HashMap<FilterId, Filter>>,
}

impl FilterStore {
    #[must_use]
    pub fn new(max_filters: usize) -> Self {
        Self {
            max: max_filters,
            filters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a filter.
    ///
    /// # Errors
    /// - `MaxFiltersReached`: the store is full
    /// - `DuplicateFilterId`: a filter with the same id is registered
    pub fn add(&self, filter: Filter) -> EventResult<()> {
        let mut filters = self.filters.lock();

        if filters.len() >= self.max {
            return Err(EventError::MaxFiltersReached { max: self.max });
        }

        let id = filter.id();
        if filters.contains_key(&id) {
            return Err(EventError::DuplicateFilterId(id));
        }

        filters.insert(id, filter);
        Ok(())
    }

    pub fn get(&self, id: FilterId) -> EventResult<Filter> {
        self.filters
            .lock()
            .get(&id)
            .cloned()
            .ok_or(EventError::FilterNotFound(id))
    }

    pub fn remove(&self, id: FilterId) -> EventResult<()> {
        self.filters
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(EventError::FilterNotFound(id))
    }

    /// Filters whose last access is strictly older than `since`.
    pub fn not_taken_since(&self, since: Timestamp) -> Vec<Filter> {
        self.filters
            .lock()
            .values()
            .filter(|f| f.last_taken() < since)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Filter> {
        self.filters.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.filters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.lock().is_empty()
    }
}
