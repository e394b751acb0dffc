use std::fs;
use std::sync::Arc;

use coffer::CofferError;
use coffer::change_set::ChangeSet;
use coffer::datatype::Id;
use coffer::resource::{ResourceSchema, TypeRegistry};
use coffer::settings::{MetadataSettings, Settings, StorageSettings};

fn types() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new().with(ResourceSchema::new("Note").attribute("body")))
}

#[test]
fn defaults_keep_everything_in_memory() {
    let settings = Settings::default();
    assert_eq!(settings.metadata["default"], MetadataSettings::Memory);
    assert_eq!(settings.storage["default"], StorageSettings::Memory);
    let registry = settings.build(types()).expect("build");
    assert!(registry.change_set_persister().is_ok());
}

#[test]
fn loads_a_file_and_builds_working_adapters() {
    let directory = tempfile::tempdir().expect("tempdir");
    let files = directory.path().join("files");
    let path = directory.path().join("coffer.toml");
    fs::write(
        &path,
        format!(
            r#"
            default_metadata = "catalog"
            default_storage = "files"

            [metadata.catalog]
            kind = "sqlite"
            path = "{}"

            [storage.files]
            kind = "disk"
            base_path = "{}"
            "#,
            directory.path().join("catalog.db").display(),
            files.display()
        ),
    )
    .expect("write settings");

    let settings = Settings::load(Some(&path)).expect("load");
    assert_eq!(settings.default_storage, "files");
    assert_eq!(settings.storage["files"], StorageSettings::Disk { base_path: files.clone() });

    let types = types();
    let registry = settings.build(types.clone()).expect("build");
    let persister = registry.change_set_persister().expect("persister");
    let mut note = types.resource("Note");
    note.set("body", "remember the milk").unwrap();
    let saved = persister.save(ChangeSet::new(note)).expect("save");
    assert!(persister.query_service().find_by(saved.id().expect("id")).is_ok());

    let file_id = Id::new(format!("disk://{}/x/y/z", files.display()));
    assert!(registry.storage_for(&file_id).is_ok());
}

#[test]
fn a_missing_settings_file_is_an_error() {
    let directory = tempfile::tempdir().expect("tempdir");
    let missing = directory.path().join("absent.toml");
    assert!(matches!(Settings::load(Some(&missing)), Err(CofferError::Config(_))));
}

#[test]
fn unknown_kinds_are_rejected() {
    let parsed = Settings::from_toml(
        r#"
        [metadata.default]
        kind = "postgres"
        "#,
    );
    assert!(matches!(parsed, Err(CofferError::Config(_))));
}

#[test]
fn indexing_needs_known_adapters() {
    let settings = Settings::from_toml(
        r#"
        [metadata.default]
        kind = "indexing"
        primary = "rows"
        index = "search"

        [metadata.rows]
        kind = "memory"
        "#,
    )
    .expect("parse");
    assert!(matches!(settings.build(types()), Err(CofferError::Config(_))));
}

#[test]
fn tracing_can_be_installed_more_than_once() {
    coffer::logging::init_tracing();
    assert!(!coffer::logging::init_tracing());
}
