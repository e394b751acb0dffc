// Behaviour every metadata adapter has to share. Each backend's test file
// instantiates the suite with `adapter_contract!`.
#![allow(dead_code, unused_macros)]

use std::sync::Arc;

use std::thread;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone, Utc};
use coffer::datatype::{Id, Value};
use coffer::persistence::{MetadataAdapter, STALE_BATCH};
use coffer::resource::{Input, MEMBER_IDS, Resource, ResourceSchema, TypeRegistry};
use coffer::{CofferError, Result};

pub fn types() -> Arc<TypeRegistry> {
    Arc::new(
        TypeRegistry::new()
            .with(
                ResourceSchema::new("Book")
                    .attribute("title")
                    .attribute("subjects")
                    .attribute("authors")
                    .attribute("published")
                    .attribute("pages")
                    .attribute("rating")
                    .attribute("in_print")
                    .attribute("homepage")
                    .attribute("editor")
                    .ordered(MEMBER_IDS),
            )
            .with(ResourceSchema::new("Author").attribute("name"))
            .with(ResourceSchema::new("Collection").attribute("title").ordered(MEMBER_IDS))
            .with(ResourceSchema::new("Ledger").attribute("title").optimistic_locking()),
    )
}

pub fn book(types: &Arc<TypeRegistry>, title: &str) -> Resource {
    Resource::build(types, "Book", [("title", Input::from(title))]).expect("book")
}

pub fn author(types: &Arc<TypeRegistry>, name: &str) -> Resource {
    Resource::build(types, "Author", [("name", Input::from(name))]).expect("author")
}

pub fn save(adapter: &dyn MetadataAdapter, resource: &Resource) -> Resource {
    adapter.persister().save(resource).expect("save")
}

pub fn id(resource: &Resource) -> Id {
    resource.id().expect("saved resources have an id").clone()
}

/// First string-like value of an attribute on each resource.
pub fn texts(resources: impl IntoIterator<Item = Result<Resource>>, attribute: &str) -> Vec<String> {
    resources
        .into_iter()
        .map(|r| r.expect("query result"))
        .map(|r| r.first(attribute).map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

fn sorted(values: &[Value]) -> Vec<String> {
    let mut values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    values.sort();
    values
}

// ------------- contract -------------
pub fn round_trips_typed_values(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let published = Utc.with_ymd_and_hms(1965, 8, 1, 12, 0, 0).unwrap();
    let editor = author(types, "Sterling Lanier");
    let mut dune = types.resource("Book");
    dune.set("title", Value::literal("Dune", "en")).unwrap();
    dune.set("subjects", vec!["ecology", "politics"]).unwrap();
    dune.set("published", published).unwrap();
    dune.set("pages", 412).unwrap();
    dune.set("rating", 4.5).unwrap();
    dune.set("in_print", true).unwrap();
    dune.set("homepage", Value::uri("http://example.com/dune")).unwrap();
    dune.set("editor", editor).unwrap();

    let saved = save(adapter, &dune);
    assert!(saved.persisted());
    assert!(saved.created_at().is_some());
    assert!(saved.updated_at().is_some());
    assert!(dune.is_new(), "save works on a copy");

    let found = adapter.query_service().find_by(&id(&saved)).expect("find");
    assert_eq!(found.tag(), "Book");
    assert_eq!(found.id(), saved.id());
    assert!(found.persisted());
    assert!(found.created_at().is_some());
    assert_eq!(found["title"], [Value::literal("Dune", "en")]);
    assert_eq!(sorted(&found["subjects"]), ["ecology", "politics"]);
    assert_eq!(found["published"], [Value::DateTime(published)]);
    assert_eq!(found["pages"], [Value::Integer(412)]);
    assert_eq!(found["rating"], [Value::Float(4.5)]);
    assert_eq!(found["in_print"], [Value::Boolean(true)]);
    assert_eq!(found["homepage"], [Value::uri("http://example.com/dune")]);
    let nested = found.first("editor").and_then(Value::as_resource).expect("nested");
    assert_eq!(nested.tag(), "Author");
    assert_eq!(nested["name"], [Value::from("Sterling Lanier")]);
}

pub fn stamps_created_once_and_updated_always(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
    let published = offset.with_ymd_and_hms(1965, 8, 1, 17, 30, 0).unwrap();
    let mut dune = book(types, "Dune");
    dune.set("published", Value::timestamp(published)).unwrap();
    let saved = save(adapter, &dune);
    let first = adapter.query_service().find_by(&id(&saved)).expect("find");
    let created = *first.created_at().expect("created_at");
    let updated = *first.updated_at().expect("updated_at");
    assert_eq!(
        first["published"],
        [Value::DateTime(Utc.with_ymd_and_hms(1965, 8, 1, 12, 0, 0).unwrap())]
    );

    thread::sleep(Duration::from_millis(5));
    let mut edited = first.clone();
    edited.set("title", "Dune Messiah").unwrap();
    save(adapter, &edited);
    let second = adapter.query_service().find_by(&id(&saved)).expect("find");
    assert_eq!(second.created_at(), Some(&created));
    assert!(*second.updated_at().expect("updated_at") > updated);
    assert_eq!(second["published"], first["published"]);
}

pub fn coerces_sets_before_storing(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let mut resource = types.resource("Book");
    resource
        .set("subjects", Input::List(vec!["x".into(), "".into(), "x".into(), Input::Null]))
        .unwrap();
    assert_eq!(resource["subjects"], [Value::from("x")]);
    let saved = save(adapter, &resource);
    let found = adapter.query_service().find_by(&id(&saved)).expect("find");
    assert_eq!(found["subjects"], [Value::from("x")]);
    assert!(found["title"].is_empty());
}

pub fn keeps_member_order(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let b = save(adapter, &book(types, "B"));
    let a = save(adapter, &book(types, "A"));
    let c = save(adapter, &book(types, "C"));
    let mut collection = types.resource("Collection");
    collection.set_member_ids(vec![id(&b), id(&a), id(&c)]).unwrap();
    let mut collection = save(adapter, &collection);

    let query = adapter.query_service();
    let stored = query.find_by(&id(&collection)).expect("find");
    assert_eq!(stored.member_ids(), vec![id(&b), id(&a), id(&c)]);
    assert_eq!(texts(query.find_members(&collection, None).unwrap(), "title"), ["B", "A", "C"]);

    collection.remove_member(&id(&b)).unwrap();
    let mut collection = save(adapter, &collection);
    let stored = query.find_by(&id(&collection)).expect("find");
    assert_eq!(stored.member_ids(), vec![id(&a), id(&c)]);

    let d = save(adapter, &book(types, "D"));
    collection.push_member(id(&d)).unwrap();
    let collection = save(adapter, &collection);
    let stored = query.find_by(&id(&collection)).expect("find");
    assert_eq!(stored.member_ids(), vec![id(&a), id(&c), id(&d)]);
    assert_eq!(texts(query.find_members(&stored, None).unwrap(), "title"), ["A", "C", "D"]);
}

pub fn keeps_repeated_members(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let a = save(adapter, &book(types, "A"));
    let b = save(adapter, &book(types, "B"));
    let mut collection = types.resource("Collection");
    collection.set_member_ids(vec![id(&b), id(&a), id(&b)]).unwrap();
    let collection = save(adapter, &collection);
    let stored = adapter.query_service().find_by(&id(&collection)).expect("find");
    assert_eq!(stored.member_ids(), vec![id(&b), id(&a), id(&b)]);
    let members = adapter.query_service().find_members(&stored, None).unwrap();
    assert_eq!(texts(members, "title"), ["B", "A", "B"]);
}

pub fn skips_dangling_members(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let a = save(adapter, &book(types, "A"));
    let tolkien = save(adapter, &author(types, "Tolkien"));
    let mut collection = types.resource("Collection");
    collection
        .set_member_ids(vec![id(&a), Id::new("missing"), id(&tolkien)])
        .unwrap();
    let collection = save(adapter, &collection);

    let query = adapter.query_service();
    assert_eq!(query.find_members(&collection, None).unwrap().count(), 2);
    let authors = query.find_members(&collection, Some("Author")).unwrap();
    assert_eq!(texts(authors, "name"), ["Tolkien"]);

    let many = query
        .find_many_by_ids(&[id(&a), Id::new("missing"), id(&a), id(&tolkien)])
        .expect("find many");
    let ids: Vec<Id> = many.iter().map(id).collect();
    assert_eq!(ids, [id(&a), id(&tolkien)]);
}

pub fn finds_parents_and_references(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let le_guin = save(adapter, &author(types, "Le Guin"));
    let herbert = save(adapter, &author(types, "Herbert"));
    let mut anthology = book(types, "Anthology");
    anthology
        .set("authors", vec![Value::Id(id(&le_guin)), Value::Id(id(&herbert))])
        .unwrap();
    let anthology = save(adapter, &anthology);
    let mut shelf = types.resource("Collection");
    shelf.set("title", "Shelf").unwrap();
    shelf.set_member_ids(vec![id(&anthology)]).unwrap();
    let shelf = save(adapter, &shelf);

    let query = adapter.query_service();
    let authors = query.find_references_by(&anthology, "authors").unwrap();
    assert_eq!(texts(authors, "name"), ["Le Guin", "Herbert"]);
    let referrers = query.find_inverse_references_by(&herbert, "authors").unwrap();
    assert_eq!(texts(referrers, "title"), ["Anthology"]);
    let parents = query.find_parents(&anthology).unwrap();
    assert_eq!(texts(parents, "title"), ["Shelf"]);
    assert_eq!(query.find_parents(&shelf).unwrap().count(), 0);
}

pub fn finds_and_counts_by_model(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    save(adapter, &book(types, "One"));
    save(adapter, &book(types, "Two"));
    save(adapter, &author(types, "Someone"));

    let query = adapter.query_service();
    assert_eq!(query.find_all().unwrap().count(), 3);
    let mut titles = texts(query.find_all_of_model("Book").unwrap(), "title");
    titles.sort();
    assert_eq!(titles, ["One", "Two"]);
    assert_eq!(query.count_all_of_model("Book").unwrap(), 2);
    assert_eq!(query.count_all_of_model("Author").unwrap(), 1);
    assert_eq!(query.count_all_of_model("Shelf").unwrap(), 0);
}

pub fn reports_missing_resources(adapter: &dyn MetadataAdapter, _types: &Arc<TypeRegistry>) {
    let missing = adapter.query_service().find_by(&Id::new("does-not-exist"));
    assert!(matches!(missing, Err(CofferError::NotFound(_))));
}

pub fn deletes_and_wipes(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let gone = save(adapter, &book(types, "Gone"));
    let kept = save(adapter, &book(types, "Kept"));
    adapter.persister().delete(&gone).expect("delete");
    let query = adapter.query_service();
    assert!(query.find_by(&id(&gone)).unwrap_err().is_not_found());
    assert!(query.find_by(&id(&kept)).is_ok());

    adapter.persister().wipe().expect("wipe");
    assert_eq!(query.find_all().unwrap().count(), 0);
    assert!(query.find_by(&id(&kept)).unwrap_err().is_not_found());
}

pub fn rejects_stale_saves(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let mut ledger = types.resource("Ledger");
    ledger.set("title", "v1").unwrap();
    let first = save(adapter, &ledger);
    let token = first.lock_token_for(adapter.lock_owner()).expect("locking types get a token").clone();

    let mut update = first.clone();
    update.set("title", "v2").unwrap();
    let second = save(adapter, &update);
    assert_ne!(second.lock_token_for(adapter.lock_owner()), Some(&token));

    let mut stale = first.clone();
    stale.set("title", "v3").unwrap();
    assert!(matches!(adapter.persister().save(&stale), Err(CofferError::StaleObject(_))));
    match adapter.persister().save_all(&[stale]) {
        Err(CofferError::StaleObject(message)) => assert_eq!(message, STALE_BATCH),
        other => panic!("expected a stale batch, got {other:?}"),
    }

    let found = adapter.query_service().find_by(&id(&first)).expect("find");
    assert_eq!(found["title"], [Value::from("v2")]);
    let mut fresh = found.clone();
    fresh.set("title", "v4").unwrap();
    assert!(adapter.persister().save(&fresh).is_ok());

    let unlocked = save(adapter, &book(types, "Free"));
    assert!(unlocked.lock_token_for(adapter.lock_owner()).is_none());
}

pub fn saves_batches(adapter: &dyn MetadataAdapter, types: &Arc<TypeRegistry>) {
    let saved = adapter
        .persister()
        .save_all(&[book(types, "One"), book(types, "Two")])
        .expect("save all");
    assert_eq!(saved.len(), 2);
    assert!(saved.iter().all(Resource::persisted));
    assert_eq!(adapter.query_service().count_all_of_model("Book").unwrap(), 2);
}

/// Expands into one `#[test]` per contract check, each with a fresh
/// adapter built by `$build(types)`.
macro_rules! adapter_contract {
    (@tests $build:expr; $($check:ident),*) => {
        $(
            #[test]
            fn $check() {
                let types = common::types();
                let adapter = ($build)(types.clone());
                common::$check(&adapter, &types);
            }
        )*
    };
    ($build:expr) => {
        adapter_contract!(@tests $build;
            round_trips_typed_values,
            stamps_created_once_and_updated_always,
            coerces_sets_before_storing,
            keeps_member_order,
            keeps_repeated_members,
            skips_dangling_members,
            finds_parents_and_references,
            finds_and_counts_by_model,
            reports_missing_resources,
            deletes_and_wipes,
            rejects_stale_saves,
            saves_batches
        );
    };
}
