#[macro_use]
mod common;

use std::sync::Arc;

use coffer::CofferError;
use coffer::persistence::MetadataAdapter;
use coffer::resource::TypeRegistry;
use coffer::solr::SolrAdapter;
use coffer::solr::client::MemorySolrCore;

use common::{author, book, id, save, types};

fn adapter(types: Arc<TypeRegistry>) -> SolrAdapter {
    SolrAdapter::new(Arc::new(MemorySolrCore::new()), "catalog", types)
}

adapter_contract!(adapter);

#[test]
fn documents_carry_typed_exact_values_and_text() {
    let types = types();
    let core = Arc::new(MemorySolrCore::new());
    let adapter = SolrAdapter::new(core.clone(), "catalog", types.clone());
    let herbert = save(&adapter, &author(&types, "Herbert"));
    let mut dune = book(&types, "Dune");
    dune.set("authors", coffer::datatype::Value::Id(id(&herbert))).unwrap();
    let dune = save(&adapter, &dune);

    let page = core.query(&format!("id:\"id-{}\"", id(&dune))).expect("query");
    assert_eq!(page.num_found, 1);
    let document = &page.docs[0];
    assert_eq!(document["title_tesim"][0], "Dune");
    assert_eq!(document["internal_resource_ssim"][0], "Book");
    assert_eq!(document["authors_ssim"][0], format!("id-{}", id(&herbert)));
    assert!(document["_version_"].as_i64().is_some());

    let by_author = core
        .query(&format!("authors_ssim:\"id-{}\"", id(&herbert)))
        .expect("query");
    assert_eq!(by_author.num_found, 1);
}

#[test]
fn resources_without_an_id_still_get_one() {
    let types = types();
    let adapter = adapter(types.clone());
    let saved = save(&adapter, &book(&types, "Anonymous"));
    assert!(saved.id().is_some());
    assert!(adapter.query_service().find_by(&id(&saved)).is_ok());
}

#[test]
fn finds_past_the_first_page() {
    let types = types();
    let adapter = adapter(types.clone());
    let books: Vec<_> = (0..250).map(|n| book(&types, &format!("Book {n}"))).collect();
    adapter.persister().save_all(&books).expect("save all");
    assert_eq!(adapter.query_service().find_all_of_model("Book").unwrap().count(), 250);
    assert_eq!(adapter.query_service().count_all_of_model("Book").unwrap(), 250);
}

#[test]
fn deleting_a_missing_document_is_not_an_error() {
    let types = types();
    let adapter = adapter(types.clone());
    let mut ghost = book(&types, "Ghost");
    ghost.set_id("never-saved");
    assert!(adapter.persister().delete(&ghost).is_ok());
}

#[test]
fn blank_ids_are_rejected() {
    let adapter = adapter(types());
    assert!(matches!(
        adapter.query_service().find_by(&"".into()),
        Err(CofferError::InvalidIdentifier(_))
    ));
}
