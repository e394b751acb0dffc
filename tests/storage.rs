mod common;

use std::io::Cursor;
use std::sync::Arc;

use coffer::CofferError;
use coffer::datatype::Id;
use coffer::ldp::client::MemoryLdpServer;
use coffer::resource::Resource;
use coffer::storage::{DiskStorage, LdpStorage, MemoryStorage, StorageAdapter};

use common::{book, types};

fn owner() -> Resource {
    let mut owner = book(&types(), "Owner");
    owner.set_id("owner-1");
    owner
}

/// Upload, read back, delete, and confirm it is gone.
fn exercise(storage: &dyn StorageAdapter, scheme: &str) {
    let uploaded = storage
        .upload(&mut Cursor::new(b"hello".to_vec()), "hello.txt", &owner())
        .expect("upload");
    assert!(uploaded.id().as_str().starts_with(scheme));
    assert!(storage.handles(uploaded.id()));
    assert_eq!(uploaded.size(), 5);

    let found = storage.find_by(uploaded.id()).expect("find");
    assert_eq!(found.read_all(), b"hello");

    storage.delete(uploaded.id()).expect("delete");
    assert!(matches!(storage.find_by(uploaded.id()), Err(CofferError::FileNotFound(_))));
    // deleting twice is fine
    storage.delete(uploaded.id()).expect("second delete");
}

#[test]
fn memory_storage() {
    exercise(&MemoryStorage::new(), "memory://");
}

#[test]
fn disk_storage() {
    let directory = tempfile::tempdir().expect("tempdir");
    let storage = DiskStorage::new(directory.path());
    exercise(&storage, "disk://");
    assert!(directory.path().join("owner-1").exists());
}

#[test]
fn disk_delete_keeps_directories_that_are_still_in_use() {
    let directory = tempfile::tempdir().expect("tempdir");
    let storage = DiskStorage::new(directory.path());
    let upload = |name: &str| {
        storage
            .upload(&mut Cursor::new(b"data".to_vec()), name, &owner())
            .expect("upload")
    };
    let parent_of = |file: &coffer::storage::StreamFile| {
        let path = file.id().as_str().trim_start_matches("disk://").to_owned();
        std::path::PathBuf::from(path).parent().expect("parent").to_path_buf()
    };

    let alone = upload("alone.txt");
    let alone_dir = parent_of(&alone);
    storage.delete(alone.id()).expect("delete");
    assert!(!alone_dir.exists());

    let shared = upload("shared.txt");
    let shared_dir = parent_of(&shared);
    std::fs::write(shared_dir.join("sidecar"), b"x").expect("write sidecar");
    storage.delete(shared.id()).expect("delete leaves a busy directory");
    assert!(shared_dir.join("sidecar").exists());
}

#[test]
fn disk_storage_refuses_paths_outside_its_base() {
    let directory = tempfile::tempdir().expect("tempdir");
    let storage = DiskStorage::new(directory.path().join("files"));
    let elsewhere = Id::new(format!("disk://{}", directory.path().join("other").display()));
    assert!(matches!(storage.find_by(&elsewhere), Err(CofferError::InvalidIdentifier(_))));
    assert!(matches!(
        storage.find_by(&Id::new("memory://1")),
        Err(CofferError::InvalidIdentifier(_))
    ));
}

#[test]
fn ldp_storage() {
    let server = Arc::new(MemoryLdpServer::new());
    let storage = LdpStorage::new(server.clone(), "http://localhost:8080/rest/binaries");
    exercise(&storage, "ldp://localhost:8080/rest/binaries/owner-1/files/");
}

#[test]
fn uploads_need_an_owner_id() {
    let storage = MemoryStorage::new();
    let unsaved = book(&types(), "Unsaved");
    assert!(matches!(
        storage.upload(&mut Cursor::new(Vec::new()), "empty", &unsaved),
        Err(CofferError::InvalidIdentifier(_))
    ));
}
