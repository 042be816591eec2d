//! The entity manager: strategy selection, query composition, backend
//! execution with recovery, result adaptation, and the pending-change commit
//! pipeline.
//!
//! A manager binds one repository scope to a target-container set for one
//! model type. The query mode is derived once at construction and never
//! changes; re-deriving it means constructing a new manager. A manager
//! instance is not safe for concurrent use from multiple threads without
//! external serialization.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::ItemAdapter;
use crate::backend::{BackendFailure, RepositoryScope, TermStore};
use crate::collection::ModelCollection;
use crate::commit::{self, CommitMode};
use crate::descriptor::{Descriptor, DescriptorRegistry};
use crate::error::{MapperError, MapperResult};
use crate::fields;
use crate::filter::FilterExpression;
use crate::ids::Locale;
use crate::model::{ContentModel, ItemKind};
use crate::pending::{change_key, PendingChangeSet};
use crate::query::{FederatedQuery, ItemQuery, KeywordInclusion, SearchQuery};
use crate::usage::ContainerUsage;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token of one manager instance; items carry it so ownership can be
/// checked before any mutation, recycle, delete, or commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    fn next() -> Self {
        Self(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Query strategy, derived once at manager construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// No containers bound; every query returns empty without a backend call.
    None,
    /// Structured item query against the single bound container.
    SingleContainerQuery,
    /// Structured query federated across all bound containers.
    FederatedQuery,
    /// Keyword/full-text search; forced for cross-cutting types bound to more
    /// than one container.
    KeywordSearch,
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryMode::None => write!(f, "None"),
            QueryMode::SingleContainerQuery => write!(f, "SingleContainerQuery"),
            QueryMode::FederatedQuery => write!(f, "FederatedQuery"),
            QueryMode::KeywordSearch => write!(f, "KeywordSearch"),
        }
    }
}

/// Parameters of one fetch/count call.
#[derive(Debug, Clone, Default)]
pub struct ItemRequest {
    pub filter: Option<FilterExpression>,
    pub row_limit: Option<u32>,
    pub start_row: Option<u32>,
    pub keywords: Vec<String>,
    pub inclusion: KeywordInclusion,
    pub refiners: Vec<String>,
}

impl ItemRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = Some(row_limit);
        self
    }

    pub fn with_start_row(mut self, start_row: u32) -> Self {
        self.start_row = Some(start_row);
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.keywords.extend(keywords);
        self
    }

    pub fn with_inclusion(mut self, inclusion: KeywordInclusion) -> Self {
        self.inclusion = inclusion;
        self
    }

    pub fn with_refiner(mut self, refiner: impl Into<String>) -> Self {
        self.refiners.push(refiner.into());
        self
    }
}

type ItemHook = Box<dyn Fn(&mut ItemQuery) + Send + Sync>;
type FederatedHook = Box<dyn Fn(&mut FederatedQuery) + Send + Sync>;
type SearchHook = Box<dyn Fn(&mut SearchQuery) + Send + Sync>;

/// Pre-execution extensibility hooks, one per strategy. Each receives the
/// mutable backend query immediately before it runs.
#[derive(Default)]
struct QueryHooks {
    item: Mutex<Option<ItemHook>>,
    federated: Mutex<Option<FederatedHook>>,
    search: Mutex<Option<SearchHook>>,
}

impl QueryHooks {
    fn fire_item(&self, query: &mut ItemQuery) {
        if let Some(hook) = &*self.item.lock().unwrap_or_else(|e| e.into_inner()) {
            hook(query);
        }
    }

    fn fire_federated(&self, query: &mut FederatedQuery) {
        if let Some(hook) = &*self.federated.lock().unwrap_or_else(|e| e.into_inner()) {
            hook(query);
        }
    }

    fn fire_search(&self, query: &mut SearchQuery) {
        if let Some(hook) = &*self.search.lock().unwrap_or_else(|e| e.into_inner()) {
            hook(query);
        }
    }
}

/// Object-to-store manager for one model type against one repository scope.
pub struct EntityManager<M: ContentModel> {
    id: ManagerId,
    scope: Arc<dyn RepositoryScope>,
    registry: Arc<DescriptorRegistry>,
    descriptor: Arc<Descriptor>,
    containers: Mutex<Vec<ContainerUsage>>,
    explicit_containers: bool,
    mode: QueryMode,
    row_limit_ceiling: Option<u32>,
    locale: Locale,
    term_store: Option<Arc<dyn TermStore>>,
    pending: Arc<PendingChangeSet>,
    hooks: QueryHooks,
    _marker: PhantomData<fn() -> M>,
}

impl<M: ContentModel> EntityManager<M> {
    /// Bind to a scope and discover the containers currently hosting `M`.
    /// Discovery happens once; the discovered set is immutable afterwards.
    pub fn new(
        scope: Arc<dyn RepositoryScope>,
        registry: Arc<DescriptorRegistry>,
    ) -> MapperResult<Self> {
        let descriptor = registry.resolve::<M>()?;
        let usages = registry.usages(scope.as_ref(), &descriptor);
        Self::build(scope, registry, descriptor, usages, false)
    }

    /// Bind to an explicit container set. The set is mutated later only by
    /// the create path, when no container exists yet.
    pub fn with_containers(
        scope: Arc<dyn RepositoryScope>,
        registry: Arc<DescriptorRegistry>,
        containers: Vec<ContainerUsage>,
    ) -> MapperResult<Self> {
        let descriptor = registry.resolve::<M>()?;
        Self::build(scope, registry, descriptor, containers, true)
    }

    /// Bind to exactly one explicit container.
    pub fn with_container(
        scope: Arc<dyn RepositoryScope>,
        registry: Arc<DescriptorRegistry>,
        container: ContainerUsage,
    ) -> MapperResult<Self> {
        Self::with_containers(scope, registry, vec![container])
    }

    fn build(
        scope: Arc<dyn RepositoryScope>,
        registry: Arc<DescriptorRegistry>,
        descriptor: Arc<Descriptor>,
        containers: Vec<ContainerUsage>,
        explicit_containers: bool,
    ) -> MapperResult<Self> {
        let mode = derive_mode(containers.len(), descriptor.container_kind().is_some());
        let locale = scope.resolve_locale();
        let term_store = scope.term_store();
        if let Some(store) = &term_store {
            store.set_working_language(&locale);
        }
        let row_limit_ceiling = scope.row_limit_ceiling();
        tracing::debug!(
            model = descriptor.type_name(),
            containers = containers.len(),
            mode = %mode,
            "entity manager constructed"
        );
        Ok(Self {
            id: ManagerId::next(),
            scope,
            registry,
            descriptor,
            containers: Mutex::new(containers),
            explicit_containers,
            mode,
            row_limit_ceiling,
            locale,
            term_store,
            pending: Arc::new(PendingChangeSet::new()),
            hooks: QueryHooks::default(),
            _marker: PhantomData,
        })
    }

    pub fn query_mode(&self) -> QueryMode {
        self.mode
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    pub fn containers(&self) -> Vec<ContainerUsage> {
        self.lock_containers().clone()
    }

    pub fn term_store(&self) -> Option<Arc<dyn TermStore>> {
        self.term_store.clone()
    }

    /// Number of items currently awaiting commit.
    pub fn pending_changes(&self) -> usize {
        self.pending.len()
    }

    /// Install the hook fired before a single-container item query executes.
    pub fn set_item_query_hook(&self, hook: impl Fn(&mut ItemQuery) + Send + Sync + 'static) {
        *self.hooks.item.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    /// Install the hook fired before a federated query executes.
    pub fn set_federated_query_hook(
        &self,
        hook: impl Fn(&mut FederatedQuery) + Send + Sync + 'static,
    ) {
        *self
            .hooks
            .federated
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    /// Install the hook fired before a search query executes.
    pub fn set_search_query_hook(&self, hook: impl Fn(&mut SearchQuery) + Send + Sync + 'static) {
        *self.hooks.search.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    fn lock_containers(&self) -> MutexGuard<'_, Vec<ContainerUsage>> {
        self.containers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch items of type `R` (which must be `M` or a specialization of it).
    ///
    /// An always-false filter or an unbound manager returns empty without any
    /// backend call. This is a contract, not an optimization: callers may
    /// build filters that statically resolve to "never match".
    pub fn get_items<R: ContentModel>(
        &self,
        request: &ItemRequest,
    ) -> MapperResult<ModelCollection<R>> {
        let requested = self.registry.resolve::<R>()?;
        if self.short_circuits(request) {
            return Ok(self.empty_collection(requested));
        }
        if !self.descriptor.contains(&requested) {
            // A manager scoped to M never returns instances of an unrelated
            // type, even if raw rows would satisfy the filter.
            return Ok(self.empty_collection(requested));
        }

        let effective = self.effective_filter(&requested, request.filter.as_ref());
        let limit = self.effective_limit(request.row_limit);

        match self.mode {
            QueryMode::None => Ok(self.empty_collection(requested)),
            QueryMode::SingleContainerQuery => {
                let view = merge_fields(requested.required_fields(), fields::ALWAYS_REQUIRED);
                let adapters = self.run_single(effective, limit, view)?;
                let total = adapters.len() as u64;
                Ok(ModelCollection::new(
                    adapters,
                    requested,
                    self.id,
                    Arc::clone(&self.pending),
                    Some(total),
                ))
            }
            QueryMode::FederatedQuery => {
                let referenced: Vec<String> = effective.fields().into_iter().collect();
                let view = merge_fields(requested.required_fields(), fields::ALWAYS_REQUIRED);
                let view = merge_string_fields(referenced, view);
                let adapters = self.run_federated(&requested, effective, limit, view)?;
                let total = adapters.len() as u64;
                Ok(ModelCollection::new(
                    adapters,
                    requested,
                    self.id,
                    Arc::clone(&self.pending),
                    Some(total),
                ))
            }
            QueryMode::KeywordSearch => {
                let (adapters, total) = self.run_search(effective, request)?;
                Ok(ModelCollection::new(
                    adapters,
                    requested,
                    self.id,
                    Arc::clone(&self.pending),
                    Some(total),
                ))
            }
        }
    }

    /// Count items of type `R` without materializing them: structured modes
    /// execute the same query shape without field projection and count rows;
    /// search reads the backend-reported total.
    pub fn get_count<R: ContentModel>(&self, request: &ItemRequest) -> MapperResult<u64> {
        let requested = self.registry.resolve::<R>()?;
        if self.short_circuits(request) || !self.descriptor.contains(&requested) {
            return Ok(0);
        }

        let effective = self.effective_filter(&requested, request.filter.as_ref());
        match self.mode {
            QueryMode::None => Ok(0),
            QueryMode::SingleContainerQuery => {
                let adapters =
                    self.run_single(effective, self.effective_limit(None), Vec::new())?;
                Ok(adapters.len() as u64)
            }
            QueryMode::FederatedQuery => {
                let adapters = self.run_federated(
                    &requested,
                    effective,
                    self.effective_limit(None),
                    Vec::new(),
                )?;
                Ok(adapters.len() as u64)
            }
            QueryMode::KeywordSearch => {
                let (_, total) = self.run_search(effective, request)?;
                Ok(total)
            }
        }
    }

    fn short_circuits(&self, request: &ItemRequest) -> bool {
        request
            .filter
            .as_ref()
            .is_some_and(FilterExpression::is_always_false)
            || self.mode == QueryMode::None
    }

    fn empty_collection<R: ContentModel>(&self, requested: Arc<Descriptor>) -> ModelCollection<R> {
        ModelCollection::empty(requested, self.id, Arc::clone(&self.pending))
    }

    /// Caller filter AND "is of the requested content type".
    fn effective_filter(
        &self,
        requested: &Descriptor,
        filter: Option<&FilterExpression>,
    ) -> FilterExpression {
        let content_type = requested.content_type_expression();
        match filter {
            Some(f) => f.clone().and(content_type),
            None => content_type,
        }
    }

    /// Requested row limit clamped to the administrative ceiling.
    fn effective_limit(&self, requested: Option<u32>) -> Option<u32> {
        match (requested, self.row_limit_ceiling) {
            (Some(r), Some(c)) => Some(r.min(c)),
            (Some(r), None) => Some(r),
            (None, ceiling) => ceiling,
        }
    }

    fn run_single(
        &self,
        effective: FilterExpression,
        limit: Option<u32>,
        view_fields: Vec<String>,
    ) -> MapperResult<Vec<Arc<ItemAdapter>>> {
        let usage = self.lock_containers().first().cloned();
        let Some(usage) = usage else {
            return Ok(Vec::new());
        };
        let Some(container) = usage.resolve(self.scope.as_ref()) else {
            return Ok(Vec::new());
        };
        if container.item_count() == 0 {
            return Ok(Vec::new());
        }

        let mut query = ItemQuery::new(effective)
            .with_view_fields(view_fields)
            .limit(limit);
        self.hooks.fire_item(&mut query);

        match container.execute_items(&query) {
            Ok(handles) => Ok(handles
                .into_iter()
                .map(|handle| Arc::new(ItemAdapter::direct(handle)))
                .collect()),
            Err(failure) => Err(self.query_failure(
                query.query_text(),
                container.server_relative_path(),
                failure,
            )),
        }
    }

    fn run_federated(
        &self,
        requested: &Descriptor,
        effective: FilterExpression,
        limit: Option<u32>,
        view_fields: Vec<String>,
    ) -> MapperResult<Vec<Arc<ItemAdapter>>> {
        let usages = self.lock_containers().clone();
        let ids = usages.iter().map(ContainerUsage::container_id).collect();
        let mut query = FederatedQuery::new(ids, effective)
            .with_view_fields(view_fields)
            .limit(limit);
        self.hooks.fire_federated(&mut query);

        match self.scope.execute_federated(&query) {
            Ok(rows) => Ok(rows
                .into_iter()
                .map(|row| Arc::new(ItemAdapter::tabular(row)))
                .collect()),
            Err(failure) if failure.is_unspecific() => {
                Err(self.diagnose_federated_failure(&query, &usages, requested, failure))
            }
            Err(failure) => {
                Err(self.query_failure(query.query_text(), self.scope.scope_url(), failure))
            }
        }
    }

    /// Secondary diagnosis for an unspecific federated failure: a read-only
    /// pass checking each bound container for missing required fields. A
    /// non-empty finding replaces the raw backend error as the reported
    /// cause; a failure during the pass is itself wrapped, never swallowed.
    fn diagnose_federated_failure(
        &self,
        query: &FederatedQuery,
        usages: &[ContainerUsage],
        requested: &Descriptor,
        original: BackendFailure,
    ) -> MapperError {
        let mut findings = Vec::new();
        for usage in usages {
            let Some(container) = usage.resolve(self.scope.as_ref()) else {
                continue;
            };
            match container.missing_required_fields(requested.required_fields()) {
                Ok(missing) if !missing.is_empty() => findings.push(format!(
                    "container `{}` is missing required fields [{}]",
                    usage.server_relative_path(),
                    missing.join(", ")
                )),
                Ok(_) => {}
                Err(diagnosis_failure) => {
                    return self.query_failure(
                        query.query_text(),
                        self.scope.scope_url(),
                        BackendFailure::execution(format!(
                            "schema diagnosis after `{}` itself failed: {}",
                            original, diagnosis_failure
                        )),
                    );
                }
            }
        }
        let cause = if findings.is_empty() {
            original
        } else {
            BackendFailure::validation(format!("schema mismatch: {}", findings.join("; ")))
        };
        self.query_failure(query.query_text(), self.scope.scope_url(), cause)
    }

    fn run_search(
        &self,
        effective: FilterExpression,
        request: &ItemRequest,
    ) -> MapperResult<(Vec<Arc<ItemAdapter>>, u64)> {
        let combined = effective.and(self.search_scope_expression());
        let mut query = SearchQuery::new(
            request.keywords.clone(),
            request.inclusion,
            self.locale.clone(),
        )
        .filter(combined)
        .with_refiners(request.refiners.iter().cloned())
        .limit(self.effective_limit(request.row_limit))
        .start_row(request.start_row);
        self.hooks.fire_search(&mut query);

        match self.scope.execute_search(&query) {
            Ok(results) => Ok((
                results
                    .rows
                    .into_iter()
                    .map(|row| Arc::new(ItemAdapter::search_row(row)))
                    .collect(),
                results.total_rows,
            )),
            Err(failure) => {
                Err(self.query_failure(query.query_text(), self.scope.scope_url(), failure))
            }
        }
    }

    /// Path-based scope restriction: one prefix predicate per explicitly
    /// supplied container, or a single scope-URL prefix for discovered sets.
    fn search_scope_expression(&self) -> FilterExpression {
        let usages = self.lock_containers();
        if self.explicit_containers && !usages.is_empty() {
            let mut expr = FilterExpression::always_false();
            for usage in usages.iter() {
                expr = expr.or(FilterExpression::begins_with(
                    fields::PATH,
                    usage.server_relative_path(),
                ));
            }
            expr
        } else {
            FilterExpression::begins_with(fields::PATH, self.scope.scope_url())
        }
    }

    fn query_failure(
        &self,
        query: String,
        scope: String,
        failure: BackendFailure,
    ) -> MapperError {
        tracing::error!(
            scope = %scope,
            query = %query,
            failure = %failure,
            "backend query execution failed"
        );
        MapperError::QueryExecution {
            query,
            scope,
            source: failure,
        }
    }

    /// Create a new item of type `R`, synthesizing a random name when the
    /// item kind requires one.
    pub fn create<R: ContentModel>(&self) -> MapperResult<Option<R>> {
        let generated = R::item_kind()
            .requires_name()
            .then(|| Uuid::new_v4().simple().to_string());
        self.create_core::<R>(generated.as_deref())
    }

    /// Create a new item of type `R` with an explicit name. Fails with
    /// `NameRequired` when the kind needs a name and `None` was supplied.
    pub fn create_named<R: ContentModel>(&self, name: Option<&str>) -> MapperResult<Option<R>> {
        self.create_core::<R>(name)
    }

    fn create_core<R: ContentModel>(&self, name: Option<&str>) -> MapperResult<Option<R>> {
        let requested = self.registry.resolve::<R>()?;
        if !self.descriptor.contains(&requested) {
            return Err(MapperError::TypeMismatch {
                expected: self.descriptor.type_name(),
                requested: requested.type_name(),
            });
        }
        if requested.is_abstract() {
            return Err(MapperError::AbstractType {
                type_name: requested.type_name(),
            });
        }
        if requested.kind().requires_name() && name.is_none() {
            return Err(MapperError::NameRequired {
                kind: requested.kind(),
            });
        }

        let usage = {
            let mut containers = self.lock_containers();
            match containers.len() {
                0 => {
                    let provisioned = self
                        .registry
                        .provision(self.scope.as_ref(), &requested)?
                        .ok_or(MapperError::NoTarget {
                            type_name: requested.type_name(),
                        })?;
                    containers.push(provisioned.clone());
                    provisioned
                }
                1 => containers[0].clone(),
                count => return Err(MapperError::AmbiguousTarget { count }),
            }
        };

        let container = usage.resolve(self.scope.as_ref()).ok_or_else(|| {
            MapperError::Backend(BackendFailure::unavailable(format!(
                "container `{}` could not be opened",
                usage.server_relative_path()
            )))
        })?;

        let content_type = requested.primary_content_type();
        if !container.hosts_content_type(content_type) {
            self.scope
                .provision_content_type(&container, &requested)?;
        }

        let name = name.unwrap_or_default();
        let handle = match requested.kind() {
            ItemKind::Page => self
                .scope
                .create_page(&container.id(), name, content_type)?,
            ItemKind::File => container.add_file(name, content_type)?,
            ItemKind::Folder | ItemKind::DocumentSet => {
                let handle = container.add_folder(name)?;
                handle.apply(
                    &content_type_assignment(content_type),
                    CommitMode::Default,
                )?;
                handle
            }
            ItemKind::Record => {
                let handle = container.add_record()?;
                handle.apply(
                    &content_type_assignment(content_type),
                    CommitMode::Default,
                )?;
                handle
            }
        };

        let adapter = Arc::new(ItemAdapter::direct(handle));
        let materializes = adapter
            .content_type_id()
            .is_some_and(|exact| requested.accepts_exact(&exact));
        if !materializes {
            return Ok(None);
        }
        Ok(Some(R::from_item(crate::model::Item::new(
            adapter,
            self.id,
            Arc::clone(&self.pending),
        ))))
    }

    fn assert_owned<R: ContentModel>(&self, model: &R) -> MapperResult<()> {
        if model.item().owner_id() != self.id {
            return Err(MapperError::ForeignItem);
        }
        Ok(())
    }

    /// Move an item's record to the recoverable trash. No-op for records that
    /// were never persisted.
    pub fn recycle<R: ContentModel>(&self, model: &R) -> MapperResult<()> {
        self.assert_owned(model)?;
        self.dispose(model, |record| record.recycle())
    }

    /// Permanently remove an item's record. No-op for records that were never
    /// persisted.
    pub fn delete<R: ContentModel>(&self, model: &R) -> MapperResult<()> {
        self.assert_owned(model)?;
        self.dispose(model, |record| record.delete())
    }

    fn dispose<R: ContentModel>(
        &self,
        model: &R,
        action: impl FnOnce(&dyn crate::backend::RecordHandle) -> crate::backend::BackendResult<()>,
    ) -> MapperResult<()> {
        let adapter = model.item().adapter();
        let persisted = adapter.identity().is_some_and(|id| id.is_persisted());
        if !persisted {
            return Ok(());
        }
        let record = adapter.record().ok_or_else(|| {
            MapperError::ReadOnlyItem("query-row items carry no record handle".to_string())
        })?;
        action(record.as_ref())?;
        self.pending.remove(&change_key(adapter));
        Ok(())
    }

    /// Drain the pending-change set with default commit semantics.
    pub fn commit_changes(&self) -> MapperResult<()> {
        self.commit_changes_with(CommitMode::Default)
    }

    /// Drain the pending-change set. A snapshot is taken first, so adapters
    /// tracked by side effects during the drain are kept for a later pass.
    /// Each adapter leaves the set only after its write succeeded.
    pub fn commit_changes_with(&self, mode: CommitMode) -> MapperResult<()> {
        for (key, adapter) in self.pending.snapshot() {
            commit::commit_adapter(self.scope.as_ref(), &adapter, mode)?;
            self.pending.remove(&key);
        }
        Ok(())
    }

    /// Commit one item's pending changes with default semantics.
    pub fn commit_item<R: ContentModel>(&self, model: &R) -> MapperResult<()> {
        self.commit_item_with(model, CommitMode::Default)
    }

    /// Commit one item's pending changes. No-op when nothing is pending for it.
    ///
    /// The write goes through the adapter tracked in the pending set, not the
    /// item's own: duplicate collapse may have drained this item's overlay
    /// into an adapter from a later fetch of the same record.
    pub fn commit_item_with<R: ContentModel>(
        &self,
        model: &R,
        mode: CommitMode,
    ) -> MapperResult<()> {
        self.assert_owned(model)?;
        let key = change_key(model.item().adapter());
        let Some(tracked) = self.pending.get(&key) else {
            return Ok(());
        };
        commit::commit_adapter(self.scope.as_ref(), &tracked, mode)?;
        self.pending.remove(&key);
        Ok(())
    }
}

/// Strategy selection: a pure function of container count and whether the
/// type has a fixed backing container kind.
fn derive_mode(container_count: usize, fixed_kind: bool) -> QueryMode {
    match container_count {
        0 => QueryMode::None,
        1 => QueryMode::SingleContainerQuery,
        _ if fixed_kind => QueryMode::FederatedQuery,
        _ => QueryMode::KeywordSearch,
    }
}

fn content_type_assignment(content_type: &crate::ids::ContentTypeId) -> BTreeMap<String, Value> {
    let mut changes = BTreeMap::new();
    changes.insert(
        fields::CONTENT_TYPE_ID.to_string(),
        Value::String(content_type.to_string()),
    );
    changes
}

/// Union of two field-name lists, preserving first-seen order.
fn merge_fields(required: &[String], always: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(required.len() + always.len());
    for field in required {
        if !out.contains(field) {
            out.push(field.clone());
        }
    }
    for field in always {
        if !out.iter().any(|f| f == field) {
            out.push((*field).to_string());
        }
    }
    out
}

fn merge_string_fields(mut base: Vec<String>, extra: Vec<String>) -> Vec<String> {
    for field in extra {
        if !base.contains(&field) {
            base.push(field);
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, RecordHandle};
    use crate::ids::{ContainerId, ContentTypeId, RecordIdentity};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    #[test]
    fn strategy_table_covers_all_branches() {
        assert_eq!(derive_mode(0, true), QueryMode::None);
        assert_eq!(derive_mode(0, false), QueryMode::None);
        assert_eq!(derive_mode(1, true), QueryMode::SingleContainerQuery);
        assert_eq!(derive_mode(1, false), QueryMode::SingleContainerQuery);
        assert_eq!(derive_mode(3, true), QueryMode::FederatedQuery);
        assert_eq!(derive_mode(2, false), QueryMode::KeywordSearch);
    }

    /// Record handle with a synthetic, never-persisted identity. Any storage
    /// call flips `touched`.
    struct UnsavedRecord {
        container: ContainerId,
        touched: AtomicBool,
    }

    impl RecordHandle for UnsavedRecord {
        fn identity(&self) -> RecordIdentity {
            RecordIdentity::unsaved(self.container)
        }

        fn content_type_id(&self) -> ContentTypeId {
            ContentTypeId::new("record")
        }

        fn field(&self, _name: &str) -> Option<Value> {
            None
        }

        fn apply(
            &self,
            _changes: &BTreeMap<String, Value>,
            _mode: CommitMode,
        ) -> BackendResult<()> {
            self.touched.store(true, AtomicOrdering::SeqCst);
            Ok(())
        }

        fn recycle(&self) -> BackendResult<()> {
            self.touched.store(true, AtomicOrdering::SeqCst);
            Ok(())
        }

        fn delete(&self) -> BackendResult<()> {
            self.touched.store(true, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    struct Plain {
        item: crate::model::Item,
    }

    impl ContentModel for Plain {
        fn content_type_ids() -> &'static [&'static str] {
            &["record"]
        }

        fn from_item(item: crate::model::Item) -> Self {
            Self { item }
        }

        fn item(&self) -> &crate::model::Item {
            &self.item
        }
    }

    #[test]
    fn recycle_and_delete_are_noops_for_unsaved_identities() {
        let scope = Arc::new(crate::memory::MemoryRepository::new("https://example/sites/a"));
        let registry = Arc::new(DescriptorRegistry::new());
        let manager = EntityManager::<Plain>::with_containers(
            scope,
            Arc::clone(&registry),
            Vec::new(),
        )
        .unwrap();

        let record = Arc::new(UnsavedRecord {
            container: ContainerId::generate(),
            touched: AtomicBool::new(false),
        });
        let adapter = Arc::new(ItemAdapter::direct(record.clone() as Arc<dyn RecordHandle>));
        let item = crate::model::Item::new(adapter, manager.id, Arc::clone(&manager.pending));
        let model = Plain::from_item(item);

        manager.recycle(&model).unwrap();
        manager.delete(&model).unwrap();
        assert!(!record.touched.load(AtomicOrdering::SeqCst));
    }
}
