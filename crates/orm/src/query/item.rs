//! Single-container structured item query

use crate::filter::FilterExpression;

/// Structured query executed against one container, recursing across its
/// sub-containers.
#[derive(Debug, Clone)]
pub struct ItemQuery {
    pub filter: FilterExpression,
    pub view_fields: Vec<String>,
    pub row_limit: Option<u32>,
    pub recursive: bool,
}

impl ItemQuery {
    pub fn new(filter: FilterExpression) -> Self {
        Self {
            filter,
            view_fields: Vec::new(),
            row_limit: None,
            recursive: true,
        }
    }

    pub fn with_view_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.view_fields.extend(fields);
        self
    }

    pub fn with_view_field(mut self, field: impl Into<String>) -> Self {
        self.view_fields.push(field.into());
        self
    }

    pub fn limit(mut self, row_limit: Option<u32>) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Textual rendering carried in query-execution errors.
    pub fn query_text(&self) -> String {
        format!(
            "ITEMS WHERE {} VIEW [{}] LIMIT {} RECURSIVE {}",
            self.filter.to_query_text(),
            self.view_fields.join(", "),
            self.row_limit
                .map_or_else(|| "NONE".to_string(), |l| l.to_string()),
            self.recursive,
        )
    }
}
