use std::path::Path;

use entity_directory::error::DirectoryError;
use entity_directory::id::ChecksumIdGenerator;
use entity_directory::model::types::{Date, Entity, Office, Patient, TypeAttributes};
use entity_directory::storage::sqlite::SqliteStorer;
use entity_directory::storage::{Parameters, Storer};

fn open_store(path: &Path) -> SqliteStorer {
    SqliteStorer::open(path, ChecksumIdGenerator::seeded(0), Parameters::default())
        .expect("open store")
}

fn office(name: &str) -> Entity {
    Entity::office("", Office { name: name.into() })
}

fn patient(last_name: &str, first_name: &str) -> Entity {
    Entity::patient(
        "",
        Patient {
            last_name: last_name.into(),
            first_name: first_name.into(),
            middle_name: None,
            suffix: None,
            birthdate: Some(Date::new(1970, 1, 1)),
        },
    )
}

fn office_name(entity: &Entity) -> &str {
    match &entity.attributes {
        TypeAttributes::Office(f) => &f.name,
        TypeAttributes::Patient(_) => panic!("wrong variant"),
    }
}

#[test]
fn office_substring_search_ranks_the_closest_name_first() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));
    for i in 1..=4 {
        store.put_entity(&office(&format!("Office Name {i}"))).unwrap();
    }

    let hits = store.search_entity("ice name 1", 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert!(
        office_name(&hits[0]).to_uppercase().contains("ICE NAME 1"),
        "unexpected first hit {:?}",
        hits[0]
    );
}

#[test]
fn patient_id_prefix_search_is_case_insensitive() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));

    let names = [("Abbott", "Adele"), ("Baldwin", "Bruno"), ("Castillo", "Celia"), ("Donovan", "Dmitri")];
    let mut ids = Vec::new();
    for (last, first) in names {
        ids.push(store.put_entity(&patient(last, first)).unwrap());
    }

    let query = ids[1].to_lowercase();
    let hits = store.search_entity(&query, 3).unwrap();
    // Results are never padded; the full-ID prefix matches exactly one row.
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity_id, query.to_uppercase());
    assert_eq!(hits[0].entity_id, ids[1]);
}

#[test]
fn name_matches_rank_across_entity_types() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));

    let patient_id = store.put_entity(&patient("Smith", "Ada")).unwrap();
    let office_id = store.put_entity(&office("Smith Clinic")).unwrap();
    store.put_entity(&office("Riverside Practice")).unwrap();

    let hits = store.search_entity("smith", 8).unwrap();
    assert_eq!(hits.len(), 2);
    // The patient name is the closer trigram match.
    assert_eq!(hits[0].entity_id, patient_id);
    assert_eq!(hits[1].entity_id, office_id);
}

#[test]
fn search_returns_at_most_limit_results() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));
    for i in 1..=6 {
        store.put_entity(&office(&format!("Office Name {i}"))).unwrap();
    }

    for limit in [1, 2, 8] {
        let hits = store.search_entity("office name", limit).unwrap();
        assert!(hits.len() <= limit);
        assert!(!hits.is_empty());
    }
}

#[test]
fn unmatched_queries_come_back_empty() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));
    store.put_entity(&office("Office Name 1")).unwrap();

    let hits = store.search_entity("zzzz", 3).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn query_and_limit_gates_fail_fast() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));

    assert!(matches!(
        store.search_entity("abc", 3),
        Err(DirectoryError::SearchQueryTooShort)
    ));
    assert!(matches!(
        store.search_entity(&"a".repeat(33), 3),
        Err(DirectoryError::SearchQueryTooLong)
    ));
    assert!(matches!(
        store.search_entity("abcd", 0),
        Err(DirectoryError::SearchLimitTooSmall)
    ));
    assert!(matches!(
        store.search_entity("abcd", 9),
        Err(DirectoryError::SearchLimitTooLarge)
    ));
}

#[test]
fn searches_see_updated_attributes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = open_store(&tmp.path().join("search.db"));

    let entity_id = store.put_entity(&office("Office Name 1")).unwrap();
    let mut renamed = office("Harbor Health Center");
    renamed.entity_id = entity_id.clone();
    store.put_entity(&renamed).unwrap();

    let hits = store.search_entity("harbor health", 3).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity_id, entity_id);

    let hits = store.search_entity("office name", 3).unwrap();
    assert!(hits.is_empty());
}
