//! Content-type descriptors and their resolution registry
//!
//! A descriptor is the resolved metadata of one model type: the content-type
//! identifiers it materializes as, the fields it needs populated, its item
//! kind, and how to express "is of this content type" as a filter predicate.
//! Resolution is memoized per registry: the same type always yields the same
//! descriptor instance for the registry's lifetime.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::{BackendResult, Container, RepositoryScope};
use crate::error::{MapperError, MapperResult};
use crate::fields;
use crate::filter::FilterExpression;
use crate::ids::ContentTypeId;
use crate::model::{ContainerKind, ContentModel, ItemKind};
use crate::usage::ContainerUsage;

/// Resolved metadata for one model type.
#[derive(Debug, Clone)]
pub struct Descriptor {
    type_id: TypeId,
    type_name: &'static str,
    content_type_ids: Vec<ContentTypeId>,
    required_fields: Vec<String>,
    kind: ItemKind,
    container_kind: Option<ContainerKind>,
    abstract_marker: bool,
}

impl Descriptor {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Ordered content-type identifiers, most specific first.
    pub fn content_type_ids(&self) -> &[ContentTypeId] {
        &self.content_type_ids
    }

    /// The identifier new items of this type are stamped with.
    pub fn primary_content_type(&self) -> &ContentTypeId {
        // Non-empty is guaranteed by resolution.
        &self.content_type_ids[0]
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Fixed backing container kind; `None` marks a cross-cutting type that
    /// cannot guarantee a single content-type family per query plan.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        self.container_kind
    }

    /// True for pure capability/interface markers that are not independently
    /// instantiable.
    pub fn is_abstract(&self) -> bool {
        self.abstract_marker
    }

    /// True if every content type of `other` is reachable as a specialization
    /// of one of this descriptor's content types.
    pub fn contains(&self, other: &Descriptor) -> bool {
        other.content_type_ids.iter().all(|theirs| {
            self.content_type_ids
                .iter()
                .any(|ours| theirs.is_descendant_of(ours))
        })
    }

    /// True if a record with the given exact content type belongs to this
    /// descriptor's type family.
    pub fn accepts_exact(&self, exact: &ContentTypeId) -> bool {
        self.content_type_ids
            .iter()
            .any(|ours| exact.is_descendant_of(ours))
    }

    /// The "restrict to my content type(s)" predicate, combined (AND) with
    /// caller filters before every query.
    pub fn content_type_expression(&self) -> FilterExpression {
        let mut ids = self.content_type_ids.iter();
        // Non-empty is guaranteed by resolution.
        let first = FilterExpression::begins_with(fields::CONTENT_TYPE_ID, ids.next().map_or("", |id| id.as_str()));
        ids.fold(first, |expr, id| {
            expr.or(FilterExpression::begins_with(
                fields::CONTENT_TYPE_ID,
                id.as_str(),
            ))
        })
    }
}

/// Memoizing descriptor resolver plus the descriptor-provider integration
/// surface (usages, provisioning, schema checks).
///
/// An explicit registry object rather than process-global state: whoever
/// constructs managers owns one and shares it; sharing one `Arc` process-wide
/// restores the "one descriptor instance per type" behavior.
#[derive(Default)]
pub struct DescriptorRegistry {
    cache: DashMap<TypeId, Arc<Descriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a model type to its descriptor, memoized for the registry's
    /// lifetime. Fails when the type carries no content-type metadata.
    pub fn resolve<T: ContentModel>(&self) -> MapperResult<Arc<Descriptor>> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.cache.get(&type_id) {
            return Ok(Arc::clone(&existing));
        }

        let ids = T::content_type_ids();
        if ids.is_empty() {
            return Err(MapperError::UnresolvableType {
                type_name: std::any::type_name::<T>(),
            });
        }

        let descriptor = self
            .cache
            .entry(type_id)
            .or_insert_with(|| {
                Arc::new(Descriptor {
                    type_id,
                    type_name: std::any::type_name::<T>(),
                    content_type_ids: ids.iter().map(|id| ContentTypeId::new(*id)).collect(),
                    required_fields: T::required_fields()
                        .iter()
                        .map(|f| f.to_string())
                        .collect(),
                    kind: T::item_kind(),
                    container_kind: T::container_kind(),
                    abstract_marker: T::is_abstract(),
                })
            })
            .clone();
        Ok(descriptor)
    }

    /// Containers under the scope currently hosting the descriptor's type,
    /// deduplicated across its content-type identifiers.
    pub fn usages(
        &self,
        scope: &dyn RepositoryScope,
        descriptor: &Descriptor,
    ) -> Vec<ContainerUsage> {
        let mut out: Vec<ContainerUsage> = Vec::new();
        for content_type in descriptor.content_type_ids() {
            for usage in scope.containers_hosting(content_type) {
                if !out.contains(&usage) {
                    out.push(usage);
                }
            }
        }
        out
    }

    /// Provision a container able to host the descriptor's type.
    pub fn provision(
        &self,
        scope: &dyn RepositoryScope,
        descriptor: &Descriptor,
    ) -> BackendResult<Option<ContainerUsage>> {
        scope.provision_container(descriptor)
    }

    /// Of the descriptor's required fields, the ones the container lacks.
    pub fn check_missing_fields(
        &self,
        container: &Arc<dyn Container>,
        descriptor: &Descriptor,
    ) -> BackendResult<Vec<String>> {
        container.missing_required_fields(descriptor.required_fields())
    }
}
