#[macro_use]
mod common;

use std::sync::Arc;
use std::thread;

use coffer::memory::MemoryAdapter;
use coffer::persistence::MetadataAdapter;
use coffer::resource::TypeRegistry;

use common::{book, id, save, types};

fn adapter(_types: Arc<TypeRegistry>) -> MemoryAdapter {
    MemoryAdapter::new()
}

adapter_contract!(adapter);

#[test]
fn saving_a_new_resource_over_an_existing_id_overwrites_it() {
    let types = types();
    let adapter = MemoryAdapter::new();
    let mut first = book(&types, "First");
    first.set_id("fixed");
    save(&adapter, &first);
    let mut second = book(&types, "Second");
    second.set_id("fixed");
    save(&adapter, &second);
    let found = adapter.query_service().find_by(&id(&second)).expect("find");
    assert_eq!(found["title"][0].to_string(), "Second");
    assert_eq!(adapter.query_service().count_all_of_model("Book").unwrap(), 1);
}

#[test]
fn deleting_an_unknown_resource_is_not_an_error() {
    let types = types();
    let adapter = MemoryAdapter::new();
    let mut ghost = book(&types, "Ghost");
    ghost.set_id("never-saved");
    assert!(adapter.persister().delete(&ghost).is_ok());
}

#[test]
fn named_adapters_do_not_share_tokens() {
    let a = MemoryAdapter::named("a");
    let b = MemoryAdapter::named("b");
    assert_ne!(a.id(), b.id());
    assert_eq!(a.id(), MemoryAdapter::named("a").id());
}

#[test]
fn concurrent_saves_all_land() {
    let types = types();
    let adapter = Arc::new(MemoryAdapter::new());
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let adapter = adapter.clone();
            let types = types.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    save(adapter.as_ref(), &book(&types, &format!("{worker}-{n}")));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }
    assert_eq!(adapter.query_service().count_all_of_model("Book").unwrap(), 100);
}
