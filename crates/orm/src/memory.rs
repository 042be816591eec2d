//! In-memory repository backend
//!
//! A complete, deterministic implementation of the backend seams, used by the
//! test suites and by examples that need a repository without external
//! infrastructure. Instrumented: call counters, failure injection, checkout
//! event logs, and unsafe-update bracket tracking are all observable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use crate::backend::{
    BackendFailure, BackendResult, Container, RecordHandle, RepositoryScope, SearchResults,
    SearchRow, TabularRow, TermStore,
};
use crate::commit::CommitMode;
use crate::descriptor::Descriptor;
use crate::fields;
use crate::filter::FilterExpression;
use crate::ids::{ContainerId, ContentTypeId, Locale, RecordId, RecordIdentity, ScopeId};
use crate::model::ContainerKind;
use crate::query::{FederatedQuery, ItemQuery, KeywordInclusion, SearchQuery};
use crate::usage::ContainerUsage;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Term store that records the working language it was assigned.
#[derive(Default)]
pub struct RecordingTermStore {
    language: Mutex<Option<String>>,
}

impl RecordingTermStore {
    pub fn working_language(&self) -> Option<String> {
        lock(&self.language).clone()
    }
}

impl TermStore for RecordingTermStore {
    fn set_working_language(&self, locale: &Locale) {
        *lock(&self.language) = Some(locale.as_str().to_string());
    }
}

/// One stored record.
pub struct MemoryRecord {
    identity: RecordIdentity,
    fields: Mutex<HashMap<String, Value>>,
    version: AtomicU64,
    requires_checkout: AtomicBool,
    checked_out: AtomicBool,
    checkout_events: Mutex<Vec<String>>,
    recycled: AtomicBool,
    deleted: AtomicBool,
    fail_next_apply: Mutex<Option<BackendFailure>>,
}

impl MemoryRecord {
    fn new(container: ContainerId, record: RecordId, fields: HashMap<String, Value>) -> Self {
        Self {
            identity: RecordIdentity::persisted(container, record),
            fields: Mutex::new(fields),
            version: AtomicU64::new(1),
            requires_checkout: AtomicBool::new(false),
            checked_out: AtomicBool::new(false),
            checkout_events: Mutex::new(Vec::new()),
            recycled: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            fail_next_apply: Mutex::new(None),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn field_value(&self, name: &str) -> Option<Value> {
        lock(&self.fields).get(name).cloned()
    }

    /// Checkout history, in order: `out` and `in(<comment>)` entries.
    pub fn checkout_events(&self) -> Vec<String> {
        lock(&self.checkout_events).clone()
    }

    pub fn enforce_checkout(&self, enforce: bool) {
        self.requires_checkout.store(enforce, Ordering::SeqCst);
    }

    pub fn fail_next_apply(&self, failure: BackendFailure) {
        *lock(&self.fail_next_apply) = Some(failure);
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::SeqCst)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn is_live(&self) -> bool {
        !self.is_recycled() && !self.is_deleted()
    }
}

impl RecordHandle for MemoryRecord {
    fn identity(&self) -> RecordIdentity {
        self.identity
    }

    fn content_type_id(&self) -> ContentTypeId {
        self.field_value(fields::CONTENT_TYPE_ID)
            .as_ref()
            .and_then(Value::as_str)
            .map(ContentTypeId::new)
            .unwrap_or_else(|| ContentTypeId::new(""))
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.field_value(name)
    }

    fn apply(&self, changes: &BTreeMap<String, Value>, mode: CommitMode) -> BackendResult<()> {
        if let Some(failure) = lock(&self.fail_next_apply).take() {
            return Err(failure);
        }
        if self.requires_checkout() && !self.is_checked_out() {
            return Err(BackendFailure::validation(format!(
                "record {} must be checked out before writing",
                self.identity
            )));
        }
        {
            let mut stored = lock(&self.fields);
            for (name, value) in changes {
                stored.insert(name.clone(), value.clone());
            }
            if mode.updates_audit_fields() {
                stored.insert(
                    fields::MODIFIED.to_string(),
                    Value::String(Utc::now().to_rfc3339()),
                );
                stored.insert(
                    fields::EDITOR.to_string(),
                    Value::String("strata".to_string()),
                );
            }
        }
        if mode.creates_version() {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn requires_checkout(&self) -> bool {
        self.requires_checkout.load(Ordering::SeqCst)
    }

    fn is_checked_out(&self) -> bool {
        self.checked_out.load(Ordering::SeqCst)
    }

    fn check_out(&self) -> BackendResult<()> {
        self.checked_out.store(true, Ordering::SeqCst);
        lock(&self.checkout_events).push("out".to_string());
        Ok(())
    }

    fn check_in(&self, comment: &str) -> BackendResult<()> {
        self.checked_out.store(false, Ordering::SeqCst);
        lock(&self.checkout_events).push(format!("in({:?})", comment));
        Ok(())
    }

    fn recycle(&self) -> BackendResult<()> {
        self.recycled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self) -> BackendResult<()> {
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One in-memory container.
pub struct MemoryContainer {
    id: ContainerId,
    scope: ScopeId,
    path: String,
    kind: ContainerKind,
    content_types: Mutex<Vec<ContentTypeId>>,
    field_schema: Mutex<BTreeSet<String>>,
    records: Mutex<Vec<Arc<MemoryRecord>>>,
    next_record: AtomicU64,
    enforce_checkout: AtomicBool,
    fail_next_items: Mutex<Option<BackendFailure>>,
    item_query_calls: AtomicU64,
}

impl MemoryContainer {
    fn new(
        scope: ScopeId,
        path: impl Into<String>,
        kind: ContainerKind,
        content_types: Vec<ContentTypeId>,
    ) -> Self {
        let mut schema: BTreeSet<String> = fields::ALWAYS_REQUIRED
            .iter()
            .map(|f| f.to_string())
            .collect();
        schema.insert(fields::PATH.to_string());
        schema.insert(fields::MODIFIED.to_string());
        schema.insert(fields::EDITOR.to_string());
        Self {
            id: ContainerId::generate(),
            scope,
            path: path.into(),
            kind,
            content_types: Mutex::new(content_types),
            field_schema: Mutex::new(schema),
            records: Mutex::new(Vec::new()),
            next_record: AtomicU64::new(1),
            enforce_checkout: AtomicBool::new(false),
            fail_next_items: Mutex::new(None),
            item_query_calls: AtomicU64::new(0),
        }
    }

    pub fn usage(&self) -> ContainerUsage {
        ContainerUsage::new(self.id, self.scope, self.path.clone())
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Enforce checkout on every record created in this container from now on.
    pub fn set_enforce_checkout(&self, enforce: bool) {
        self.enforce_checkout.store(enforce, Ordering::SeqCst);
    }

    pub fn fail_next_item_query(&self, failure: BackendFailure) {
        *lock(&self.fail_next_items) = Some(failure);
    }

    pub fn item_query_calls(&self) -> u64 {
        self.item_query_calls.load(Ordering::SeqCst)
    }

    pub fn attach_content_type(&self, content_type: ContentTypeId) {
        let mut attached = lock(&self.content_types);
        if !attached.contains(&content_type) {
            attached.push(content_type);
        }
    }

    pub fn add_schema_field(&self, name: impl Into<String>) {
        lock(&self.field_schema).insert(name.into());
    }

    pub fn remove_schema_field(&self, name: &str) {
        lock(&self.field_schema).remove(name);
    }

    /// Insert a record directly, bypassing the creation path.
    pub fn seed_record(
        &self,
        content_type: &str,
        values: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Arc<MemoryRecord> {
        let mut map: HashMap<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        map.insert(
            fields::CONTENT_TYPE_ID.to_string(),
            Value::String(content_type.to_string()),
        );
        self.insert(map)
    }

    pub fn live_record_count(&self) -> usize {
        lock(&self.records).iter().filter(|r| r.is_live()).count()
    }

    fn insert(&self, fields_map: HashMap<String, Value>) -> Arc<MemoryRecord> {
        let id = RecordId::new(self.next_record.fetch_add(1, Ordering::SeqCst));
        let record = Arc::new(MemoryRecord::new(self.id, id, fields_map));
        record.enforce_checkout(self.enforce_checkout.load(Ordering::SeqCst));
        lock(&self.records).push(Arc::clone(&record));
        record
    }

    /// Record fields plus synthesized identity/path fields, the shape both
    /// the filter evaluator and result projection work from.
    fn augmented_fields(&self, record: &MemoryRecord) -> HashMap<String, Value> {
        let mut map = lock(&record.fields).clone();
        if let Some(id) = record.identity.record {
            map.insert(fields::ID.to_string(), Value::from(id.value()));
        }
        map.insert(
            fields::CONTAINER_ID.to_string(),
            Value::String(self.id.to_string()),
        );
        map.entry(fields::PATH.to_string()).or_insert_with(|| {
            Value::String(format!(
                "{}/{}",
                self.path,
                record
                    .identity
                    .record
                    .map_or_else(String::new, |r| r.to_string())
            ))
        });
        map
    }

    fn matching_records(
        &self,
        filter: &FilterExpression,
        limit: Option<u32>,
    ) -> Vec<(Arc<MemoryRecord>, HashMap<String, Value>)> {
        let records = lock(&self.records).clone();
        let mut out = Vec::new();
        for record in records {
            if !record.is_live() {
                continue;
            }
            let augmented = self.augmented_fields(&record);
            if filter.evaluate(&augmented) {
                out.push((record, augmented));
                if limit.is_some_and(|l| out.len() as u64 >= u64::from(l)) {
                    break;
                }
            }
        }
        out
    }
}

impl Container for MemoryContainer {
    fn id(&self) -> ContainerId {
        self.id
    }

    fn server_relative_path(&self) -> String {
        self.path.clone()
    }

    fn item_count(&self) -> u64 {
        self.live_record_count() as u64
    }

    fn hosts_content_type(&self, content_type: &ContentTypeId) -> bool {
        lock(&self.content_types)
            .iter()
            .any(|attached| content_type.is_descendant_of(attached))
    }

    fn execute_items(&self, query: &ItemQuery) -> BackendResult<Vec<Arc<dyn RecordHandle>>> {
        self.item_query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = lock(&self.fail_next_items).take() {
            return Err(failure);
        }
        Ok(self
            .matching_records(&query.filter, query.row_limit)
            .into_iter()
            .map(|(record, _)| record as Arc<dyn RecordHandle>)
            .collect())
    }

    fn add_record(&self) -> BackendResult<Arc<dyn RecordHandle>> {
        Ok(self.insert(HashMap::new()))
    }

    fn add_file(
        &self,
        name: &str,
        content_type: &ContentTypeId,
    ) -> BackendResult<Arc<dyn RecordHandle>> {
        let mut map = HashMap::new();
        map.insert(
            fields::TITLE.to_string(),
            Value::String(name.to_string()),
        );
        map.insert(
            fields::CONTENT_TYPE_ID.to_string(),
            Value::String(content_type.to_string()),
        );
        Ok(self.insert(map))
    }

    fn add_folder(&self, name: &str) -> BackendResult<Arc<dyn RecordHandle>> {
        let mut map = HashMap::new();
        map.insert(
            fields::TITLE.to_string(),
            Value::String(name.to_string()),
        );
        Ok(self.insert(map))
    }

    fn missing_required_fields(&self, required: &[String]) -> BackendResult<Vec<String>> {
        let schema = lock(&self.field_schema);
        Ok(required
            .iter()
            .filter(|field| !schema.contains(*field))
            .cloned()
            .collect())
    }
}

/// In-memory repository scope.
pub struct MemoryRepository {
    scope_id: ScopeId,
    scope_url: String,
    locale: Mutex<Locale>,
    row_limit_ceiling: Mutex<Option<u32>>,
    containers: Mutex<Vec<Arc<MemoryContainer>>>,
    auto_provision: AtomicBool,
    term_store: Mutex<Option<Arc<RecordingTermStore>>>,
    fail_next_federated: Mutex<Option<BackendFailure>>,
    fail_next_search: Mutex<Option<BackendFailure>>,
    federated_calls: AtomicU64,
    search_calls: AtomicU64,
    page_creations: AtomicU64,
    unsafe_update_depth: AtomicI64,
    unsafe_update_windows: AtomicU64,
}

impl MemoryRepository {
    pub fn new(scope_url: impl Into<String>) -> Self {
        Self {
            scope_id: ScopeId::generate(),
            scope_url: scope_url.into(),
            locale: Mutex::new(Locale::new("en-US")),
            row_limit_ceiling: Mutex::new(None),
            containers: Mutex::new(Vec::new()),
            auto_provision: AtomicBool::new(true),
            term_store: Mutex::new(None),
            fail_next_federated: Mutex::new(None),
            fail_next_search: Mutex::new(None),
            federated_calls: AtomicU64::new(0),
            search_calls: AtomicU64::new(0),
            page_creations: AtomicU64::new(0),
            unsafe_update_depth: AtomicI64::new(0),
            unsafe_update_windows: AtomicU64::new(0),
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    pub fn set_locale(&self, tag: impl Into<String>) {
        *lock(&self.locale) = Locale::new(tag);
    }

    pub fn set_row_limit_ceiling(&self, ceiling: Option<u32>) {
        *lock(&self.row_limit_ceiling) = ceiling;
    }

    /// Allow or forbid on-demand container provisioning by the create path.
    pub fn set_auto_provision(&self, enabled: bool) {
        self.auto_provision.store(enabled, Ordering::SeqCst);
    }

    pub fn enable_term_store(&self) -> Arc<RecordingTermStore> {
        let store = Arc::new(RecordingTermStore::default());
        *lock(&self.term_store) = Some(Arc::clone(&store));
        store
    }

    pub fn add_container(
        &self,
        path: impl Into<String>,
        kind: ContainerKind,
        content_types: &[&str],
    ) -> Arc<MemoryContainer> {
        let container = Arc::new(MemoryContainer::new(
            self.scope_id,
            path,
            kind,
            content_types.iter().map(|ct| ContentTypeId::new(*ct)).collect(),
        ));
        lock(&self.containers).push(Arc::clone(&container));
        container
    }

    pub fn fail_next_federated(&self, failure: BackendFailure) {
        *lock(&self.fail_next_federated) = Some(failure);
    }

    pub fn fail_next_search(&self, failure: BackendFailure) {
        *lock(&self.fail_next_search) = Some(failure);
    }

    pub fn federated_calls(&self) -> u64 {
        self.federated_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn page_creations(&self) -> u64 {
        self.page_creations.load(Ordering::SeqCst)
    }

    /// Completed unsafe-update brackets.
    pub fn unsafe_update_windows(&self) -> u64 {
        self.unsafe_update_windows.load(Ordering::SeqCst)
    }

    /// Currently open unsafe-update brackets; zero when every write finished.
    pub fn unsafe_update_depth(&self) -> i64 {
        self.unsafe_update_depth.load(Ordering::SeqCst)
    }

    fn find(&self, id: &ContainerId) -> Option<Arc<MemoryContainer>> {
        lock(&self.containers)
            .iter()
            .find(|c| c.id == *id)
            .cloned()
    }

    fn keywords_match(keywords: &[String], inclusion: KeywordInclusion, haystack: &str) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let mut hits = keywords
            .iter()
            .map(|k| haystack.contains(&k.to_lowercase()));
        match inclusion {
            KeywordInclusion::All => hits.all(|h| h),
            KeywordInclusion::Any => hits.any(|h| h),
        }
    }
}

impl RepositoryScope for MemoryRepository {
    fn scope_url(&self) -> String {
        self.scope_url.clone()
    }

    fn row_limit_ceiling(&self) -> Option<u32> {
        *lock(&self.row_limit_ceiling)
    }

    fn open_container(&self, id: &ContainerId) -> Option<Arc<dyn Container>> {
        self.find(id).map(|c| c as Arc<dyn Container>)
    }

    fn containers_hosting(&self, content_type: &ContentTypeId) -> Vec<ContainerUsage> {
        lock(&self.containers)
            .iter()
            .filter(|c| c.hosts_content_type(content_type))
            .map(|c| c.usage())
            .collect()
    }

    fn provision_container(
        &self,
        descriptor: &Descriptor,
    ) -> BackendResult<Option<ContainerUsage>> {
        if !self.auto_provision.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let kind = descriptor
            .container_kind()
            .unwrap_or(ContainerKind::GenericList);
        let path = format!(
            "{}/lists/{}",
            self.scope_url,
            descriptor.primary_content_type()
        );
        let container = self.add_container(
            path,
            kind,
            &[descriptor.primary_content_type().as_str()],
        );
        for field in descriptor.required_fields() {
            container.add_schema_field(field.clone());
        }
        Ok(Some(container.usage()))
    }

    fn provision_content_type(
        &self,
        container: &Arc<dyn Container>,
        descriptor: &Descriptor,
    ) -> BackendResult<()> {
        let container = self.find(&container.id()).ok_or_else(|| {
            BackendFailure::unavailable(format!("unknown container {}", container.id()))
        })?;
        container.attach_content_type(descriptor.primary_content_type().clone());
        for field in descriptor.required_fields() {
            container.add_schema_field(field.clone());
        }
        Ok(())
    }

    fn create_page(
        &self,
        container: &ContainerId,
        name: &str,
        content_type: &ContentTypeId,
    ) -> BackendResult<Arc<dyn RecordHandle>> {
        let container = self.find(container).ok_or_else(|| {
            BackendFailure::unavailable(format!("unknown container {}", container))
        })?;
        self.page_creations.fetch_add(1, Ordering::SeqCst);
        let mut map = HashMap::new();
        map.insert(
            fields::TITLE.to_string(),
            Value::String(name.to_string()),
        );
        map.insert(
            fields::CONTENT_TYPE_ID.to_string(),
            Value::String(content_type.to_string()),
        );
        Ok(container.insert(map))
    }

    fn execute_federated(&self, query: &FederatedQuery) -> BackendResult<Vec<TabularRow>> {
        self.federated_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = lock(&self.fail_next_federated).take() {
            return Err(failure);
        }
        let mut rows = Vec::new();
        'containers: for id in &query.containers {
            let Some(container) = self.find(id) else {
                continue;
            };
            for (record, augmented) in container.matching_records(&query.filter, None) {
                let Some(record_id) = record.identity.record else {
                    continue;
                };
                // Project requested view fields; identity and type fields
                // always come back regardless of projection.
                let mut projected: HashMap<String, Value> = if query.view_fields.is_empty() {
                    augmented.clone()
                } else {
                    query
                        .view_fields
                        .iter()
                        .filter_map(|f| augmented.get(f).map(|v| (f.clone(), v.clone())))
                        .collect()
                };
                for always in [fields::ID, fields::CONTENT_TYPE_ID, fields::CONTAINER_ID] {
                    if let Some(value) = augmented.get(always) {
                        projected.insert(always.to_string(), value.clone());
                    }
                }
                rows.push(TabularRow {
                    container: container.id,
                    record: record_id,
                    fields: projected,
                });
                if query
                    .row_limit
                    .is_some_and(|l| rows.len() as u64 >= u64::from(l))
                {
                    break 'containers;
                }
            }
        }
        Ok(rows)
    }

    fn execute_search(&self, query: &SearchQuery) -> BackendResult<SearchResults> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = lock(&self.fail_next_search).take() {
            return Err(failure);
        }
        let containers = lock(&self.containers).clone();
        let mut matching: Vec<SearchRow> = Vec::new();
        for container in &containers {
            for record in lock(&container.records).clone() {
                if !record.is_live() {
                    continue;
                }
                let augmented = container.augmented_fields(&record);
                let haystack = augmented
                    .values()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                if !Self::keywords_match(&query.keywords, query.inclusion, &haystack) {
                    continue;
                }
                if !query.filter.evaluate(&augmented) {
                    continue;
                }
                let path = augmented
                    .get(fields::PATH)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                matching.push(SearchRow {
                    path,
                    fields: augmented,
                });
            }
        }
        let total_rows = matching.len() as u64;
        let start = query.start_row.unwrap_or(0) as usize;
        let rows: Vec<SearchRow> = matching
            .into_iter()
            .skip(start)
            .take(
                query
                    .row_limit
                    .map_or(usize::MAX, |l| l as usize),
            )
            .collect();
        Ok(SearchResults { rows, total_rows })
    }

    fn resolve_locale(&self) -> Locale {
        lock(&self.locale).clone()
    }

    fn term_store(&self) -> Option<Arc<dyn TermStore>> {
        lock(&self.term_store)
            .clone()
            .map(|s| s as Arc<dyn TermStore>)
    }

    fn begin_unsafe_updates(&self) {
        self.unsafe_update_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn end_unsafe_updates(&self) {
        self.unsafe_update_depth.fetch_sub(1, Ordering::SeqCst);
        self.unsafe_update_windows.fetch_add(1, Ordering::SeqCst);
    }
}
