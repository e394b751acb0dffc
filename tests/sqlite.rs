#[macro_use]
mod common;

use std::sync::Arc;

use coffer::CofferError;
use coffer::datatype::Value;
use coffer::persistence::MetadataAdapter;
use coffer::resource::TypeRegistry;
use coffer::sqlite::SqliteAdapter;

use common::{author, book, id, save, texts, types};

fn adapter(types: Arc<TypeRegistry>) -> SqliteAdapter {
    SqliteAdapter::in_memory(types).expect("in-memory database")
}

adapter_contract!(adapter);

#[test]
fn recreating_an_existing_resource_is_illegal() {
    let types = types();
    let adapter = adapter(types.clone());
    let mut first = book(&types, "First");
    first.set_id("fixed");
    save(&adapter, &first);
    let mut second = book(&types, "Second");
    second.set_id("fixed");
    assert!(matches!(
        adapter.persister().save(&second),
        Err(CofferError::IllegalOperation(_))
    ));
}

#[test]
fn rows_survive_reopening_the_file() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = directory.path().join("catalog.db");
    let types = types();
    let saved = {
        let adapter = SqliteAdapter::open(&path, types.clone()).expect("open");
        let mut ledger = types.resource("Ledger");
        ledger.set("title", "kept").unwrap();
        save(&adapter, &ledger)
    };
    let adapter = SqliteAdapter::open(&path, types.clone()).expect("reopen");
    let found = adapter.query_service().find_by(&id(&saved)).expect("find");
    assert_eq!(found["title"], [Value::from("kept")]);
    // same file, same adapter identity, so the old token is still valid
    let mut update = saved.clone();
    update.set("title", "changed").unwrap();
    assert!(adapter.persister().save(&update).is_ok());
}

#[test]
fn deleting_an_unknown_row_is_not_an_error() {
    let types = types();
    let adapter = adapter(types.clone());
    let mut ghost = book(&types, "Ghost");
    ghost.set_id("never-saved");
    assert!(adapter.persister().delete(&ghost).is_ok());
}

#[test]
fn references_come_from_the_stored_row() {
    let types = types();
    let adapter = adapter(types.clone());
    let herbert = save(&adapter, &author(&types, "Frank Herbert"));
    let anderson = save(&adapter, &author(&types, "Kevin J. Anderson"));
    let mut dune = book(&types, "Dune");
    dune.set("authors", Value::Id(id(&herbert))).unwrap();
    let dune = save(&adapter, &dune);

    let mut edited = dune.clone();
    edited.set("authors", Value::Id(id(&anderson))).unwrap();
    let query = adapter.query_service();
    assert_eq!(texts(query.find_references_by(&edited, "authors").unwrap(), "name"), ["Frank Herbert"]);

    let edited = save(&adapter, &edited);
    assert_eq!(texts(query.find_references_by(&edited, "authors").unwrap(), "name"), ["Kevin J. Anderson"]);
}
