//! Query routing: strategy derivation, short-circuits, filter composition,
//! hooks, limits, and backend failure recovery.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::Value;

use common::{BaseRecord, Contract, Document, Taggable};
use strata_orm::{
    BackendFailure, BackendFailureKind, ContainerKind, ContentModel, EntityManager,
    FilterExpression, ItemRequest, KeywordInclusion, MapperError, QueryMode, SearchQuery,
};

#[test]
fn single_container_routes_through_an_item_query() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    list.seed_record("record", [("Title", Value::from("plain"))]);
    list.seed_record("record.document", [("Title", Value::from("doc"))]);
    // Prefix-matches the content-type filter but fails the segment-aware
    // compatibility check, so the row is adapted and then skipped.
    list.seed_record("recorder", [("Title", Value::from("imposter"))]);

    let manager = EntityManager::<BaseRecord>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::SingleContainerQuery);

    let collection = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.raw_len(), 3);
    assert_eq!(collection.to_vec().len(), 2);
    assert_eq!(list.item_query_calls(), 1);
    assert_eq!(repo.federated_calls(), 0);
    assert_eq!(repo.search_calls(), 0);
}

#[test]
fn unbound_manager_returns_empty_without_backend_calls() {
    let (repo, registry) = common::repository();
    let manager =
        EntityManager::<BaseRecord>::with_containers(repo.clone(), registry, Vec::new()).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::None);

    let collection = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.total_count(), Some(0));
    assert_eq!(manager.get_count::<BaseRecord>(&ItemRequest::new()).unwrap(), 0);
    assert_eq!(repo.federated_calls(), 0);
    assert_eq!(repo.search_calls(), 0);
}

#[test]
fn always_false_filter_short_circuits() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    list.seed_record("record", []);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let request = ItemRequest::new().with_filter(FilterExpression::always_false());
    let collection = manager.get_items::<BaseRecord>(&request).unwrap();
    assert_eq!(collection.raw_len(), 0);
    assert_eq!(manager.get_count::<BaseRecord>(&request).unwrap(), 0);
    assert_eq!(list.item_query_calls(), 0);
}

#[test]
fn empty_container_is_not_queried() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let collection = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.raw_len(), 0);
    assert_eq!(list.item_query_calls(), 0);
}

#[test]
fn unrelated_type_yields_empty_without_backend_calls() {
    let (repo, registry) = common::repository();
    let library = repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );
    library.seed_record("record.document", []);

    // BaseRecord is a generalization of Document, not a specialization.
    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let collection = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.raw_len(), 0);
    assert_eq!(library.item_query_calls(), 0);
}

#[test]
fn specialization_narrows_the_content_type_filter() {
    let (repo, registry) = common::repository();
    let library = repo.add_container(
        "/sites/acme/lists/docs",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );
    library.seed_record("record.document", [("Title", Value::from("plain doc"))]);
    library.seed_record(
        "record.document.contract",
        [("Title", Value::from("nda"))],
    );

    let manager = EntityManager::<Document>::new(repo, registry).unwrap();
    let contracts = manager.get_items::<Contract>(&ItemRequest::new()).unwrap();
    assert_eq!(contracts.raw_len(), 1);
    let names: Vec<_> = contracts
        .iter()
        .map(|c| c.item().field_string("Title").unwrap())
        .collect();
    assert_eq!(names, vec!["nda"]);
}

#[test]
fn caller_filter_is_anded_with_the_content_type_filter() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    list.seed_record("record", [("Title", Value::from("keep"))]);
    list.seed_record("record", [("Title", Value::from("drop"))]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let request = ItemRequest::new().with_filter(FilterExpression::equals("Title", "keep"));
    let items = manager.get_items::<BaseRecord>(&request).unwrap().to_vec();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item().field_string("Title").unwrap(), "keep");
}

#[test]
fn fixed_kind_over_several_containers_routes_through_federation() {
    let (repo, registry) = common::repository();
    let mut libraries = Vec::new();
    for name in ["a", "b", "c"] {
        let library = repo.add_container(
            format!("/sites/acme/lists/docs-{name}"),
            ContainerKind::DocumentLibrary,
            &["record.document"],
        );
        library.seed_record("record.document", [("Title", Value::from(format!("doc {name}")))]);
        libraries.push(library);
    }

    let manager = EntityManager::<Document>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::FederatedQuery);

    let collection = manager
        .get_items::<Document>(&ItemRequest::new().with_limit(10))
        .unwrap();
    assert_eq!(collection.raw_len(), 3);
    assert_eq!(repo.federated_calls(), 1);
    for library in &libraries {
        assert_eq!(library.item_query_calls(), 0);
    }
}

#[test]
fn cross_cutting_type_over_several_containers_routes_through_search() {
    let (repo, registry) = common::repository();
    for name in ["x", "y"] {
        let list = repo.add_container(
            format!("/sites/acme/lists/tagged-{name}"),
            ContainerKind::GenericList,
            &["capability.taggable"],
        );
        list.seed_record(
            "capability.taggable",
            [("Title", Value::from(format!("alpha item {name}")))],
        );
    }

    let manager = EntityManager::<Taggable>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::KeywordSearch);

    let captured: Arc<Mutex<Option<SearchQuery>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);
    manager.set_search_query_hook(move |query| {
        *sink.lock().unwrap() = Some(query.clone());
    });

    let request = ItemRequest::new()
        .with_keyword("alpha")
        .with_inclusion(KeywordInclusion::Any);
    let collection = manager.get_items::<Taggable>(&request).unwrap();
    assert_eq!(collection.raw_len(), 2);
    assert_eq!(collection.total_count(), Some(2));
    assert_eq!(repo.search_calls(), 1);

    // Discovered container sets are scoped by the scope URL, not per path.
    let query = captured.lock().unwrap().clone().unwrap();
    assert_eq!(query.inclusion, KeywordInclusion::Any);
    assert!(query.filter.to_query_text().contains("/sites/acme"));
    assert_eq!(query.locale.as_str(), "en-US");
}

#[test]
fn explicit_containers_scope_search_per_path() {
    let (repo, registry) = common::repository();
    let a = repo.add_container(
        "/sites/acme/lists/tags-a",
        ContainerKind::GenericList,
        &["capability.taggable"],
    );
    let b = repo.add_container(
        "/sites/acme/lists/tags-b",
        ContainerKind::GenericList,
        &["capability.taggable"],
    );
    a.seed_record("capability.taggable", [("Title", Value::from("alpha"))]);
    b.seed_record("capability.taggable", [("Title", Value::from("alpha"))]);

    let manager = EntityManager::<Taggable>::with_containers(
        repo,
        registry,
        vec![a.usage(), b.usage()],
    )
    .unwrap();

    let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);
    manager.set_search_query_hook(move |query| {
        *sink.lock().unwrap() = Some(query.filter.to_query_text());
    });

    manager
        .get_items::<Taggable>(&ItemRequest::new().with_keyword("alpha"))
        .unwrap();
    let filter_text = captured.lock().unwrap().clone().unwrap();
    assert!(filter_text.contains("/sites/acme/lists/tags-a"));
    assert!(filter_text.contains("/sites/acme/lists/tags-b"));
}

#[test]
fn hooks_mutate_the_query_before_execution() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    for i in 0..3 {
        list.seed_record("record", [("Title", Value::from(format!("r{i}")))]);
    }

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    manager.set_item_query_hook(|query| {
        query.row_limit = Some(1);
    });

    let collection = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.raw_len(), 1);
}

#[test]
fn federated_hooks_mutate_the_query_before_execution() {
    let (repo, registry) = common::repository();
    for name in ["a", "b"] {
        let library = repo.add_container(
            format!("/sites/acme/lists/docs-{name}"),
            ContainerKind::DocumentLibrary,
            &["record.document"],
        );
        library.add_schema_field("Author");
        library.seed_record("record.document", [("Title", Value::from(name))]);
    }

    let manager = EntityManager::<Document>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::FederatedQuery);
    manager.set_federated_query_hook(|query| {
        query.row_limit = Some(1);
    });

    let collection = manager.get_items::<Document>(&ItemRequest::new()).unwrap();
    assert_eq!(collection.raw_len(), 1);
    assert_eq!(repo.federated_calls(), 1);
}

#[test]
fn row_limits_are_clamped_to_the_scope_ceiling() {
    let (repo, registry) = common::repository();
    repo.set_row_limit_ceiling(Some(2));
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    for i in 0..4 {
        list.seed_record("record", [("Title", Value::from(format!("r{i}")))]);
    }

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let over = manager
        .get_items::<BaseRecord>(&ItemRequest::new().with_limit(10))
        .unwrap();
    assert_eq!(over.raw_len(), 2);

    let unlimited = manager.get_items::<BaseRecord>(&ItemRequest::new()).unwrap();
    assert_eq!(unlimited.raw_len(), 2);

    let under = manager
        .get_items::<BaseRecord>(&ItemRequest::new().with_limit(1))
        .unwrap();
    assert_eq!(under.raw_len(), 1);
}

#[test]
fn item_query_failures_carry_query_and_scope() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    list.seed_record("record", []);
    list.fail_next_item_query(BackendFailure::unavailable("list is offline"));

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    let err = manager
        .get_items::<BaseRecord>(&ItemRequest::new())
        .unwrap_err();
    match err {
        MapperError::QueryExecution { query, scope, source } => {
            assert_eq!(scope, "/sites/acme/lists/records");
            assert!(query.starts_with("ITEMS WHERE"));
            assert_eq!(source.kind, BackendFailureKind::Unavailable);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unspecific_federated_failure_triggers_schema_diagnosis() {
    let (repo, registry) = common::repository();
    let good = repo.add_container(
        "/sites/acme/lists/docs-good",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );
    good.add_schema_field("Author");
    good.seed_record("record.document", []);
    let bad = repo.add_container(
        "/sites/acme/lists/docs-bad",
        ContainerKind::DocumentLibrary,
        &["record.document"],
    );
    bad.seed_record("record.document", []);

    let manager = EntityManager::<Document>::new(repo.clone(), registry).unwrap();
    assert_eq!(manager.query_mode(), QueryMode::FederatedQuery);

    repo.fail_next_federated(BackendFailure::execution("malformed response"));
    let err = manager
        .get_items::<Document>(&ItemRequest::new())
        .unwrap_err();
    match err {
        MapperError::QueryExecution { source, .. } => {
            assert_eq!(source.kind, BackendFailureKind::Validation);
            assert!(source.message.contains("missing required fields"));
            assert!(source.message.contains("Author"));
            assert!(source.message.contains("/sites/acme/lists/docs-bad"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn diagnosis_without_findings_surfaces_the_original_failure() {
    let (repo, registry) = common::repository();
    for name in ["a", "b"] {
        let library = repo.add_container(
            format!("/sites/acme/lists/docs-{name}"),
            ContainerKind::DocumentLibrary,
            &["record.document"],
        );
        library.add_schema_field("Author");
        library.seed_record("record.document", []);
    }

    let manager = EntityManager::<Document>::new(repo.clone(), registry).unwrap();
    repo.fail_next_federated(BackendFailure::execution("malformed response"));
    let err = manager
        .get_items::<Document>(&ItemRequest::new())
        .unwrap_err();
    match err {
        MapperError::QueryExecution { source, .. } => {
            assert_eq!(source.kind, BackendFailureKind::Execution);
            assert_eq!(source.message, "malformed response");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn specific_federated_failures_skip_the_diagnosis() {
    let (repo, registry) = common::repository();
    for name in ["a", "b"] {
        let library = repo.add_container(
            format!("/sites/acme/lists/docs-{name}"),
            ContainerKind::DocumentLibrary,
            &["record.document"],
        );
        // Missing Author would produce a finding if a diagnosis ran.
        library.seed_record("record.document", []);
    }

    let manager = EntityManager::<Document>::new(repo.clone(), registry).unwrap();
    repo.fail_next_federated(BackendFailure::unavailable("index offline"));
    let err = manager
        .get_items::<Document>(&ItemRequest::new())
        .unwrap_err();
    match err {
        MapperError::QueryExecution { source, .. } => {
            assert_eq!(source.kind, BackendFailureKind::Unavailable);
            assert_eq!(source.message, "index offline");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn count_matches_returned_rows_for_structured_queries() {
    let (repo, registry) = common::repository();
    let list = repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);
    list.seed_record("record", [("Title", Value::from("a"))]);
    list.seed_record("record", [("Title", Value::from("b"))]);
    list.seed_record("other", [("Title", Value::from("c"))]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    assert_eq!(manager.get_count::<BaseRecord>(&ItemRequest::new()).unwrap(), 2);
}

#[test]
fn search_count_uses_the_backend_total_independent_of_the_window() {
    let (repo, registry) = common::repository();
    for name in ["x", "y"] {
        let list = repo.add_container(
            format!("/sites/acme/lists/tagged-{name}"),
            ContainerKind::GenericList,
            &["capability.taggable"],
        );
        for i in 0..3 {
            list.seed_record(
                "capability.taggable",
                [("Title", Value::from(format!("alpha {name} {i}")))],
            );
        }
    }

    let manager = EntityManager::<Taggable>::new(repo, registry).unwrap();
    let request = ItemRequest::new().with_keyword("alpha").with_limit(1);
    let collection = manager.get_items::<Taggable>(&request).unwrap();
    assert_eq!(collection.raw_len(), 1);
    assert_eq!(collection.total_count(), Some(6));
    assert_eq!(manager.get_count::<Taggable>(&request).unwrap(), 6);
}

#[test]
fn term_store_receives_the_working_language_once_at_construction() {
    let (repo, registry) = common::repository();
    repo.set_locale("de-DE");
    let store = repo.enable_term_store();
    repo.add_container("/sites/acme/lists/records", ContainerKind::GenericList, &["record"]);

    let manager = EntityManager::<BaseRecord>::new(repo, registry).unwrap();
    assert_eq!(manager.locale().as_str(), "de-DE");
    assert_eq!(store.working_language().as_deref(), Some("de-DE"));
    assert!(manager.term_store().is_some());
}
