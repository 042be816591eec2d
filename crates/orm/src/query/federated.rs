//! Federated structured query spanning several containers

use crate::filter::FilterExpression;
use crate::ids::ContainerId;

/// Structured query spanning an explicit set of containers under one scope,
/// recursing across sub-scopes, executed in a single backend request.
#[derive(Debug, Clone)]
pub struct FederatedQuery {
    pub containers: Vec<ContainerId>,
    pub filter: FilterExpression,
    pub view_fields: Vec<String>,
    pub row_limit: Option<u32>,
    pub recursive: bool,
}

impl FederatedQuery {
    pub fn new(containers: Vec<ContainerId>, filter: FilterExpression) -> Self {
        Self {
            containers,
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
        let containers: Vec<String> = self.containers.iter().map(|c| c.to_string()).collect();
        format!(
            "FEDERATED OVER [{}] WHERE {} VIEW [{}] LIMIT {}",
            containers.join(", "),
            self.filter.to_query_text(),
            self.view_fields.join(", "),
            self.row_limit
                .map_or_else(|| "NONE".to_string(), |l| l.to_string()),
        )
    }
}
