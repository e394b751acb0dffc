//! Binary content, kept apart from metadata. Every adapter owns an
//! identifier scheme (`memory://`, `disk://`, `ldp://`) and claims the
//! identifiers carrying it.
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::datatype::Id;
use crate::error::{CofferError, Result};
use crate::ldp::client::LdpClient;
use crate::resource::Resource;

/// Content of a stored file, readable once.
#[derive(Debug)]
pub struct StreamFile {
    id: Id,
    content: Cursor<Vec<u8>>,
}

impl StreamFile {
    pub fn new(id: Id, content: Vec<u8>) -> Self {
        Self {
            id,
            content: Cursor::new(content),
        }
    }
    pub fn id(&self) -> &Id {
        &self.id
    }
    pub fn size(&self) -> u64 {
        self.content.get_ref().len() as u64
    }
    pub fn read_all(self) -> Vec<u8> {
        self.content.into_inner()
    }
}

impl Read for StreamFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

pub trait StorageAdapter: Send + Sync {
    fn handles(&self, id: &Id) -> bool;
    /// Fails with FileNotFound for identifiers nothing is stored under.
    fn find_by(&self, id: &Id) -> Result<StreamFile>;
    /// Stores `file` for `resource`, which must already have an identifier,
    /// and returns it under its new identifier.
    fn upload(&self, file: &mut dyn Read, filename: &str, resource: &Resource) -> Result<StreamFile>;
    fn delete(&self, id: &Id) -> Result<()>;
}

fn path_of<'a>(id: &'a Id, scheme: &str) -> Result<&'a str> {
    id.as_str()
        .strip_prefix(scheme)
        .ok_or_else(|| CofferError::InvalidIdentifier(format!("{id} is not a {scheme} identifier")))
}

fn not_found(id: &Id) -> CofferError {
    CofferError::FileNotFound(id.to_string())
}

/// Only the last path component of a client supplied name is kept.
fn safe_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "file".to_owned())
}

// ------------- memory -------------
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<Id, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn handles(&self, id: &Id) -> bool {
        id.as_str().starts_with(MEMORY_SCHEME)
    }

    fn find_by(&self, id: &Id) -> Result<StreamFile> {
        let files = self.files.read()?;
        let content = files.get(id).ok_or_else(|| not_found(id))?;
        Ok(StreamFile::new(id.clone(), content.clone()))
    }

    fn upload(&self, file: &mut dyn Read, filename: &str, resource: &Resource) -> Result<StreamFile> {
        let owner = resource.require_id()?;
        let id = Id::new(format!("{MEMORY_SCHEME}{}", Uuid::new_v4()));
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        self.files.write()?.insert(id.clone(), content.clone());
        debug!(%id, %owner, filename, "stored in memory");
        Ok(StreamFile::new(id, content))
    }

    fn delete(&self, id: &Id) -> Result<()> {
        self.files.write()?.remove(id);
        Ok(())
    }
}

// ------------- disk -------------
pub const DISK_SCHEME: &str = "disk://";

/// Files under `<base>/<resource id>/<random>/<filename>`.
pub struct DiskStorage {
    base_path: PathBuf,
}

impl DiskStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
    fn file_path(&self, id: &Id) -> Result<PathBuf> {
        let path = PathBuf::from(path_of(id, DISK_SCHEME)?);
        if !path.starts_with(&self.base_path) {
            return Err(CofferError::InvalidIdentifier(format!(
                "{id} is outside {}",
                self.base_path.display()
            )));
        }
        Ok(path)
    }
}

impl StorageAdapter for DiskStorage {
    fn handles(&self, id: &Id) -> bool {
        id.as_str().starts_with(DISK_SCHEME)
    }

    fn find_by(&self, id: &Id) -> Result<StreamFile> {
        let path = self.file_path(id)?;
        match fs::read(&path) {
            Ok(content) => Ok(StreamFile::new(id.clone(), content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn upload(&self, file: &mut dyn Read, filename: &str, resource: &Resource) -> Result<StreamFile> {
        let owner = resource.require_id()?;
        let directory = self
            .base_path
            .join(owner.as_str().trim_start_matches('/'))
            .join(Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&directory)?;
        let path = directory.join(safe_filename(filename));
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        fs::write(&path, &content)?;
        let id = Id::new(format!("{DISK_SCHEME}{}", path.display()));
        debug!(%id, %owner, "stored on disk");
        Ok(StreamFile::new(id, content))
    }

    /// Removes the file and the directory created for it.
    fn delete(&self, id: &Id) -> Result<()> {
        let path = self.file_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if let Some(directory) = path.parent() {
            match fs::remove_dir(directory) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {}
                Err(e) => debug!(directory = %directory.display(), error = %e, "kept file directory"),
            }
        }
        Ok(())
    }
}

// ------------- linked data -------------
pub const LDP_SCHEME: &str = "ldp://";

/// Binaries stored next to the metadata, below `<base>/<resource id>/files`.
/// Identifiers are the binary URI with its scheme replaced by `ldp://`.
pub struct LdpStorage {
    client: Arc<dyn LdpClient>,
    base_uri: String,
    scheme: String,
}

impl LdpStorage {
    pub fn new(client: Arc<dyn LdpClient>, base_uri: &str) -> Self {
        let base_uri = base_uri.trim_end_matches('/').to_owned();
        let scheme = match base_uri.split_once("://") {
            Some((scheme, _)) => format!("{scheme}://"),
            None => "http://".to_owned(),
        };
        Self {
            client,
            base_uri,
            scheme,
        }
    }
    fn uri(&self, id: &Id) -> Result<String> {
        Ok(format!("{}{}", self.scheme, path_of(id, LDP_SCHEME)?))
    }
}

impl StorageAdapter for LdpStorage {
    fn handles(&self, id: &Id) -> bool {
        id.as_str().starts_with(LDP_SCHEME)
    }

    fn find_by(&self, id: &Id) -> Result<StreamFile> {
        match self.client.get_binary(&self.uri(id)?)? {
            Some(content) => Ok(StreamFile::new(id.clone(), content)),
            None => Err(not_found(id)),
        }
    }

    fn upload(&self, file: &mut dyn Read, filename: &str, resource: &Resource) -> Result<StreamFile> {
        let owner = resource.require_id()?;
        let uri = format!(
            "{}/{}/files/{}",
            self.base_uri,
            owner.as_str().trim_start_matches('/'),
            Uuid::new_v4().simple()
        );
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        self.client.put_binary(&uri, &content, &safe_filename(filename))?;
        let path = uri.strip_prefix(&self.scheme).unwrap_or(&uri);
        let id = Id::new(format!("{LDP_SCHEME}{path}"));
        debug!(%id, %owner, "stored as binary");
        Ok(StreamFile::new(id, content))
    }

    fn delete(&self, id: &Id) -> Result<()> {
        self.client.delete(&self.uri(id)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_filenames_cannot_escape() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename(""), "file");
        assert_eq!(safe_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn schemes_pick_the_adapter() {
        let memory = MemoryStorage::new();
        let disk = DiskStorage::new("/tmp/coffer");
        assert!(memory.handles(&Id::new("memory://1")));
        assert!(!memory.handles(&Id::new("disk:///tmp/coffer/1")));
        assert!(disk.handles(&Id::new("disk:///tmp/coffer/1")));
        assert!(matches!(
            disk.find_by(&Id::new("disk:///etc/passwd")),
            Err(CofferError::InvalidIdentifier(_))
        ));
    }
}
