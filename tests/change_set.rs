mod common;

use std::io::Read;
use std::sync::Arc;

use coffer::change_set::{ChangeSet, ChangeSetPersister, PendingFile};
use coffer::datatype::Value;
use coffer::memory::MemoryAdapter;
use coffer::persistence::MetadataAdapter;
use coffer::resource::{FILE_IDENTIFIERS, FILE_SET, ORIGINAL_FILENAME};
use coffer::sqlite::SqliteAdapter;
use coffer::storage::{DiskStorage, MemoryStorage, StorageAdapter};

use common::{book, id, texts, types};

fn in_memory() -> ChangeSetPersister {
    ChangeSetPersister::new(Arc::new(MemoryAdapter::new()), Arc::new(MemoryStorage::new()))
}

#[test]
fn files_become_file_set_members() {
    let types = types();
    let persister = in_memory();
    let change_set = ChangeSet::new(book(&types, "Illustrated")).with_files([
        PendingFile::from_bytes("cover.png", b"png".to_vec()),
        PendingFile::from_bytes("../../etc/notes.txt", "notes"),
    ]);
    let saved = persister.save(change_set).expect("save");

    let query = persister.query_service();
    let file_sets: Vec<_> = query
        .find_members(&saved, Some(FILE_SET))
        .unwrap()
        .collect::<coffer::Result<_>>()
        .unwrap();
    assert_eq!(file_sets.len(), 2);
    assert_eq!(file_sets[0][ORIGINAL_FILENAME], [Value::from("cover.png")]);

    let file_id = file_sets[1]
        .first(FILE_IDENTIFIERS)
        .and_then(Value::as_id)
        .expect("file identifier");
    let mut content = String::new();
    persister
        .storage_adapter()
        .find_by(file_id)
        .expect("stored file")
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "notes");
}

#[test]
fn appending_links_the_parent() {
    let types = types();
    let persister = in_memory();
    let mut shelf = types.resource("Collection");
    shelf.set("title", "Shelf").unwrap();
    let shelf = persister.save(shelf.into()).expect("save shelf");

    let first = persister
        .save(ChangeSet::new(book(&types, "First")).append_to(id(&shelf)))
        .expect("save first");
    let second = persister
        .save(ChangeSet::new(book(&types, "Second")).append_to(id(&shelf)))
        .expect("save second");

    let query = persister.query_service();
    let shelf = query.find_by(&id(&shelf)).expect("find");
    assert_eq!(shelf.member_ids(), vec![id(&first), id(&second)]);
    assert_eq!(texts(query.find_parents(&second).unwrap(), "title"), ["Shelf"]);
}

#[test]
fn appending_to_a_missing_parent_keeps_the_child() {
    let types = types();
    let persister = in_memory();
    let mut orphan = book(&types, "Orphan");
    orphan.set_id("orphan");
    let result = persister.save(ChangeSet::new(orphan).append_to("no-such-parent"));
    assert!(result.unwrap_err().is_not_found());
    assert!(persister.query_service().find_by(&"orphan".into()).is_ok());
}

#[test]
fn deleting_unlinks_from_every_parent() {
    let types = types();
    let persister = in_memory();
    let child = persister.save(book(&types, "Child").into()).expect("save child");
    let mut parents = Vec::new();
    for title in ["Left", "Right"] {
        let mut parent = types.resource("Collection");
        parent.set("title", title).unwrap();
        parent.set_member_ids(vec![id(&child), id(&child)]).unwrap();
        parents.push(persister.save(parent.into()).expect("save parent"));
    }

    persister.delete(&child.clone().into()).expect("delete");
    let query = persister.query_service();
    assert!(query.find_by(&id(&child)).unwrap_err().is_not_found());
    for parent in parents {
        assert!(query.find_by(&id(&parent)).unwrap().member_ids().is_empty());
    }
}

#[test]
fn files_on_disk_with_a_relational_catalog() {
    let directory = tempfile::tempdir().expect("tempdir");
    let types = types();
    let persister = ChangeSetPersister::new(
        Arc::new(SqliteAdapter::in_memory(types.clone()).expect("sqlite")),
        Arc::new(DiskStorage::new(directory.path())),
    );
    let saved = persister
        .save(ChangeSet::new(book(&types, "Scanned")).with_files([PendingFile::new(
            "page-1.tif",
            &b"tiff"[..],
        )]))
        .expect("save");
    let file_set = persister
        .query_service()
        .find_members(&saved, None)
        .unwrap()
        .next()
        .expect("one member")
        .unwrap();
    let file_id = file_set.first(FILE_IDENTIFIERS).and_then(Value::as_id).expect("file id");
    assert!(file_id.as_str().starts_with("disk://"));
    let stored = persister.storage_adapter().find_by(file_id).expect("stored");
    assert_eq!(stored.read_all(), b"tiff");
}

#[test]
fn saving_many_stops_at_the_first_failure() {
    let types = types();
    let persister = in_memory();
    let saved = persister
        .save_all([
            ChangeSet::new(book(&types, "One")),
            ChangeSet::new(book(&types, "Two")).append_to("missing"),
            ChangeSet::new(book(&types, "Three")),
        ])
        .map(|saved| saved.len());
    assert!(saved.is_err());
    assert_eq!(persister.query_service().count_all_of_model("Book").unwrap(), 2);
    assert_eq!(persister.metadata_adapter().query_service().find_all().unwrap().count(), 2);
}
