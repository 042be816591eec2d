//! Item creation: per-kind construction paths, precondition errors, and
//! container/content-type provisioning.

mod common;

use serde_json::Value;

use common::{BaseRecord, Contract, Document, Dossier, LandingPage, SealedCapability};
use strata_orm::{
    Container, ContainerKind, ContentModel, EntityManager, ItemKind, ItemRequest, MapperError,
    QueryMode,
};

#[test]
fn record_creation_assigns_the_content_type_by_follow_up() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let record = manager.create::<BaseRecord>().unwrap().expect("materializes");
    assert_eq!(
        record.item().content_type_id().unwrap().as_str(),
        "record"
    );
    assert!(record.item().identity().unwrap().is_persisted());
    assert_eq!(list.live_record_count(), 1);

    let fetched = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(fetched.to_vec().len(), 1);
}

#[test]
fn file_creation_presets_the_content_type_and_name() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let doc = manager
        .create_named::<Document>(Some("q3-report"))
        .unwrap()
        .expect("materializes");
    assert_eq!(doc.item().field_string("Title").unwrap(), "q3-report");
    assert_eq!(
        doc.item().content_type_id().unwrap().as_str(),
        "record.document"
    );
}

#[test]
fn named_kinds_without_a_name_are_rejected() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let err = manager.create_named::<Document>(None).unwrap_err();
    assert!(matches!(
        err,
        MapperError::NameRequired {
            kind: ItemKind::File
        }
    ));
}

#[test]
fn create_synthesizes_a_name_for_named_kinds() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let doc = manager.create::<Document>().unwrap().expect("materializes");
    let name = doc.item().field_string("Title").unwrap();
    assert!(!name.is_empty());
}

#[test]
fn abstract_markers_cannot_be_instantiated() {
    let (repo, registry) = common::repository();
    repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let err = manager.create::<SealedCapability>().unwrap_err();
    assert!(matches!(err, MapperError::AbstractType { .. }));
}

#[test]
fn creation_of_an_unrelated_type_is_a_type_mismatch() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let err = manager.create::<BaseRecord>().unwrap_err();
    assert!(matches!(err, MapperError::TypeMismatch { .. }));
}

#[test]
fn creation_over_several_containers_is_ambiguous() {
    let (repo, registry) = common::repository();
    for name in ["a", "b"] {
        repo.add_container(
            format!("/sites/acme/lists/docs-{name}"),
            ContainerKind::DocumentLibrary,
            &["record.document"],
        );
    }

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let err = manager.create_named::<Document>(Some("x")).unwrap_err();
    assert!(matches!(err, MapperError::AmbiguousTarget { count: 2 }));
}

#[test]
fn creation_without_containers_provisions_one() {
    let (repo, registry) = common::repository();
    let manager = EntityManager::<BaseRecord>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::None);
    assert!(manager.containers().is_empty());

    let record = manager.create::<BaseRecord>().unwrap().expect("materializes");
    assert!(record.item().identity().unwrap().is_persisted());
    assert_eq!(manager.containers().len(), 1);
    // The strategy was derived at construction and does not change.
    assert_eq!(manager.query_mode(), QueryMode::None);

    // A second create reuses the provisioned container.
    manager.create::<BaseRecord>().unwrap();
    assert_eq!(manager.containers().len(), 1);
}

#[test]
fn creation_fails_when_nothing_can_be_provisioned() {
    let (repo, registry) = common::repository();
    repo.set_auto_provision(false);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let err = manager.create::<BaseRecord>().unwrap_err();
    assert!(matches!(err, MapperError::NoTarget { .. }));
}

#[test]
fn missing_content_types_are_attached_before_creation() {
    let (repo, registry) = common::repository();
    let library = repo.add_container(
        "/sites/acme/lists/misc",
        ContainerKind::DocumentLibrary,
        &["other"],
    );
    assert!(library
        .missing_required_fields(&["Author".to_string()])
        .unwrap()
        .contains(&"Author".to_string()));

    let manager =
        EntityManager::<Document>::with_container(repo, registry, library.usage()).unwrap();
    manager
        .create_named::<Document>(Some("report"))
        .unwrap()
        .expect("materializes");

    assert!(library.hosts_content_type(&"record.document".into()));
    assert!(library
        .missing_required_fields(&["Author".to_string()])
        .unwrap()
        .is_empty());
}

#[test]
fn page_creation_goes_through_the_publishing_path() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/pages",
        ContainerKind::PageLibrary,
        &["page.landing"],
    );

    let manager = EntityManager::<LandingPage>::new(repo.clone(), registry).unwrap();
    let page = manager
        .create_named::<LandingPage>(Some("home"))
        .unwrap()
        .expect("materializes");
    assert_eq!(repo.page_creations(), 1);
    assert_eq!(page.item().field_string("Title").unwrap(), "home");
}

#[test]
fn document_set_creation_stamps_the_content_type() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/dossiers",
        ContainerKind::DocumentLibrary,
        &["record.document.dossier"],
    );

    let manager = EntityManager::<Dossier>::new(repo, registry).unwrap();
    let dossier = manager
        .create_named::<Dossier>(Some("case-17"))
        .unwrap()
        .expect("materializes");
    assert_eq!(
        dossier.item().content_type_id().unwrap().as_str(),
        "record.document.dossier"
    );
    assert_eq!(dossier.item().field_string("Title").unwrap(), "case-17");
}

#[test]
fn a_manager_can_create_specializations_of_its_type() {
    let (repo, registry) = common::repository();
    repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let contract = manager
        .create_named::<Contract>(Some("nda"))
        .unwrap()
        .expect("materializes");
    assert_eq!(
        contract.item().content_type_id().unwrap().as_str(),
        "record.document.contract"
    );
}
