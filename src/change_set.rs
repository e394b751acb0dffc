//! Saving a resource together with its files and its place in a parent.
//!
//! A save runs as a sequence of independent writes: file sets first, then
//! the resource, then the parent it is appended to. Nothing is rolled back;
//! when the parent update fails the resource stays saved but unlinked and
//! the error is returned as is.
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use tracing::{debug, info};

use crate::datatype::{Id, Value};
use crate::error::Result;
use crate::persistence::{MetadataAdapter, Persister, QueryService};
use crate::resource::{FILE_IDENTIFIERS, FILE_SET, ORIGINAL_FILENAME, Resource};
use crate::storage::StorageAdapter;

/// A file waiting to be attached.
pub struct PendingFile {
    filename: String,
    content: Box<dyn Read + Send>,
}

impl PendingFile {
    pub fn new(filename: impl Into<String>, content: impl Read + Send + 'static) -> Self {
        Self {
            filename: filename.into(),
            content: Box::new(content),
        }
    }
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(filename, Cursor::new(bytes.into()))
    }
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PendingFile({})", self.filename)
    }
}

#[derive(Debug)]
pub struct ChangeSet {
    resource: Resource,
    files: Vec<PendingFile>,
    append_id: Option<Id>,
}

impl ChangeSet {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            files: Vec::new(),
            append_id: None,
        }
    }
    pub fn with_files(mut self, files: impl IntoIterator<Item = PendingFile>) -> Self {
        self.files.extend(files);
        self
    }
    /// After saving, append the resource to the members of `parent`.
    pub fn append_to(mut self, parent: impl Into<Id>) -> Self {
        self.append_id = Some(parent.into());
        self
    }
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
    pub fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }
    pub fn append_id(&self) -> Option<&Id> {
        self.append_id.as_ref()
    }
    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }
}

impl From<Resource> for ChangeSet {
    fn from(resource: Resource) -> Self {
        Self::new(resource)
    }
}

/// A metadata adapter and a storage adapter bound together.
pub struct ChangeSetPersister {
    metadata: Arc<dyn MetadataAdapter>,
    storage: Arc<dyn StorageAdapter>,
}

impl ChangeSetPersister {
    pub fn new(metadata: Arc<dyn MetadataAdapter>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { metadata, storage }
    }
    pub fn metadata_adapter(&self) -> &Arc<dyn MetadataAdapter> {
        &self.metadata
    }
    pub fn storage_adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }
    pub fn persister(&self) -> &dyn Persister {
        self.metadata.persister()
    }
    pub fn query_service(&self) -> &dyn QueryService {
        self.metadata.query_service()
    }

    pub fn save(&self, change_set: ChangeSet) -> Result<Resource> {
        let ChangeSet {
            mut resource,
            files,
            append_id,
        } = change_set;
        for file in files {
            let file_set = self.attach(file, &resource)?;
            resource.push_member(file_set.require_id()?.clone())?;
        }
        let saved = self.persister().save(&resource)?;
        if let Some(parent_id) = append_id {
            let mut parent = self.query_service().find_by(&parent_id)?;
            parent.push_member(saved.require_id()?.clone())?;
            self.persister().save(&parent)?;
            debug!(id = ?saved.id(), parent = %parent_id, "appended to parent");
        }
        info!(id = ?saved.id(), tag = saved.tag(), "change set saved");
        Ok(saved)
    }

    /// Uploads the file and saves the file set that records it.
    fn attach(&self, mut file: PendingFile, owner: &Resource) -> Result<Resource> {
        let mut file_set = owner.types().resource(FILE_SET);
        file_set.assign_id_if_absent();
        let stored = self
            .storage
            .upload(&mut file.content, &file.filename, &file_set)?;
        file_set.set(FILE_IDENTIFIERS, Value::Id(stored.id().clone()))?;
        file_set.set(ORIGINAL_FILENAME, file.filename.as_str())?;
        let saved = self.persister().save(&file_set)?;
        debug!(id = ?saved.id(), file = %stored.id(), size = stored.size(), "file attached");
        Ok(saved)
    }

    /// Removes the resource from every parent listing it, then deletes it.
    pub fn delete(&self, change_set: &ChangeSet) -> Result<()> {
        let resource = &change_set.resource;
        let id = resource.require_id()?;
        let parents: Vec<Resource> = self
            .query_service()
            .find_parents(resource)?
            .collect::<Result<_>>()?;
        for mut parent in parents {
            parent.remove_member(id)?;
            self.persister().save(&parent)?;
            debug!(%id, parent = ?parent.id(), "removed from parent");
        }
        self.persister().delete(resource)?;
        info!(%id, "change set deleted");
        Ok(())
    }

    /// Each change set is saved on its own; the first failure stops the run.
    pub fn save_all(&self, change_sets: impl IntoIterator<Item = ChangeSet>) -> Result<Vec<Resource>> {
        change_sets.into_iter().map(|c| self.save(c)).collect()
    }
}
