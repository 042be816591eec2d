//! Keyword/full-text search query

use serde::{Deserialize, Serialize};

use crate::filter::FilterExpression;
use crate::ids::Locale;

/// Whether every keyword must match or any keyword suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeywordInclusion {
    #[default]
    All,
    Any,
}

impl std::fmt::Display for KeywordInclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeywordInclusion::All => write!(f, "ALL"),
            KeywordInclusion::Any => write!(f, "ANY"),
        }
    }
}

/// Query against the keyword search index: keywords plus a structured filter
/// (already carrying the path-based scope restriction), windowed by start row
/// and row limit, localized to the manager's working culture.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub inclusion: KeywordInclusion,
    pub filter: FilterExpression,
    pub refiners: Vec<String>,
    pub row_limit: Option<u32>,
    pub start_row: Option<u32>,
    pub locale: Locale,
}

impl SearchQuery {
    pub fn new(keywords: Vec<String>, inclusion: KeywordInclusion, locale: Locale) -> Self {
        Self {
            keywords,
            inclusion,
            filter: FilterExpression::always_false(),
            refiners: Vec::new(),
            row_limit: None,
            start_row: None,
            locale,
        }
    }

    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_refiners(mut self, refiners: impl IntoIterator<Item = String>) -> Self {
        self.refiners.extend(refiners);
        self
    }

    pub fn limit(mut self, row_limit: Option<u32>) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn start_row(mut self, start_row: Option<u32>) -> Self {
        self.start_row = start_row;
        self
    }

    /// Textual rendering carried in query-execution errors.
    pub fn query_text(&self) -> String {
        format!(
            "SEARCH {} [{}] WHERE {} REFINE [{}] START {} LIMIT {} LOCALE {}",
            self.inclusion,
            self.keywords.join(", "),
            self.filter.to_query_text(),
            self.refiners.join(", "),
            self.start_row.unwrap_or(0),
            self.row_limit
                .map_or_else(|| "NONE".to_string(), |l| l.to_string()),
            self.locale,
        )
    }
}
