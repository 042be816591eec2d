//! Shared model types and fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use strata_orm::{
    ContainerKind, ContentModel, DescriptorRegistry, Item, ItemKind, MemoryRepository,
};

#[derive(Debug)]
pub struct BaseRecord {
    item: Item,
}

impl ContentModel for BaseRecord {
    fn content_type_ids() -> &'static [&'static str] {
        &["record"]
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

#[derive(Debug)]
pub struct Document {
    item: Item,
}

impl ContentModel for Document {
    fn content_type_ids() -> &'static [&'static str] {
        &["record.document"]
    }

    fn required_fields() -> &'static [&'static str] {
        &["Title", "Author"]
    }

    fn item_kind() -> ItemKind {
        ItemKind::File
    }

    fn container_kind() -> Option<ContainerKind> {
        Some(ContainerKind::DocumentLibrary)
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

#[derive(Debug)]
pub struct Contract {
    item: Item,
}

impl ContentModel for Contract {
    fn content_type_ids() -> &'static [&'static str] {
        &["record.document.contract"]
    }

    fn required_fields() -> &'static [&'static str] {
        &["Title", "Author"]
    }

    fn item_kind() -> ItemKind {
        ItemKind::File
    }

    fn container_kind() -> Option<ContainerKind> {
        Some(ContainerKind::DocumentLibrary)
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

#[derive(Debug)]
pub struct Dossier {
    item: Item,
}

impl ContentModel for Dossier {
    fn content_type_ids() -> &'static [&'static str] {
        &["record.document.dossier"]
    }

    fn item_kind() -> ItemKind {
        ItemKind::DocumentSet
    }

    fn container_kind() -> Option<ContainerKind> {
        Some(ContainerKind::DocumentLibrary)
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

#[derive(Debug)]
pub struct LandingPage {
    item: Item,
}

impl ContentModel for LandingPage {
    fn content_type_ids() -> &'static [&'static str] {
        &["page.landing"]
    }

    fn item_kind() -> ItemKind {
        ItemKind::Page
    }

    fn container_kind() -> Option<ContainerKind> {
        Some(ContainerKind::PageLibrary)
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

/// Cross-cutting capability: no fixed backing container kind, so spanning
/// several containers routes through the search index.
#[derive(Debug)]
pub struct Taggable {
    item: Item,
}

impl ContentModel for Taggable {
    fn content_type_ids() -> &'static [&'static str] {
        &["capability.taggable"]
    }

    fn container_kind() -> Option<ContainerKind> {
        None
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

/// Pure capability marker; queryable, never instantiable.
#[derive(Debug)]
pub struct SealedCapability {
    item: Item,
}

impl ContentModel for SealedCapability {
    fn content_type_ids() -> &'static [&'static str] {
        &["record.sealed"]
    }

    fn is_abstract() -> bool {
        true
    }

    fn from_item(item: Item) -> Self {
        Self { item }
    }

    fn item(&self) -> &Item {
        &self.item
    }
}

pub fn repository() -> (Arc<MemoryRepository>, Arc<DescriptorRegistry>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
    (
        Arc::new(MemoryRepository::new("/sites/acme")),
        Arc::new(DescriptorRegistry::new()),
    )
}
