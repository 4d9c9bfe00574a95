//! Query-string parameters.
//!
//! Handlers combine several `Query` extractors over the same query string;
//! each one picks the fields it knows.

use serde::Deserialize;

use crate::error::ApiError;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
pub const MIN_SEARCH_LEN: usize = 3;

/// `limit` and `offset` as sent by the client.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validated pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// Applies defaults and bounds: `limit` in `1..=100` (default 20),
    /// `offset >= 0` (default 0).
    ///
    /// # Errors
    /// Returns [`ApiError::BadRequest`] for out-of-range values.
    pub fn page(self) -> Result<Page, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::BadRequest("offset must be non-negative".into()));
        }
        Ok(Page { limit, offset })
    }
}

/// `category` filter of the top-volume listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

impl SearchQuery {
    /// The trimmed search term.
    ///
    /// # Errors
    /// Returns [`ApiError::BadRequest`] for terms shorter than three characters.
    pub fn term(&self) -> Result<&str, ApiError> {
        let term = self.q.trim();
        if term.chars().count() < MIN_SEARCH_LEN {
            return Err(ApiError::BadRequest(format!(
                "q must be at least {MIN_SEARCH_LEN} characters"
            )));
        }
        Ok(term)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ActiveFilter {
    #[serde(default)]
    pub active_only: bool,
}
