//! In-memory store fakes for engine tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    EntryKind, PrimaryStore, PrimaryUpload, RemoteEntry, RemoteError, RemoteFile,
    SecondaryObject, SecondaryStore, SecondaryUpload,
};

#[derive(Debug, Clone)]
struct StoredFile {
    id: String,
    bytes: Vec<u8>,
    mime_type: String,
}

/// Primary store keeping files in a path-keyed map
#[derive(Default)]
pub struct FakePrimary {
    files: Mutex<HashMap<String, StoredFile>>,
    dirs: Mutex<Vec<String>>,
    next_id: AtomicU64,
    pub downloads: AtomicUsize,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_downloads: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FakePrimary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file directly, bypassing counters; returns its id
    pub fn put(&self, path: &str, bytes: &[u8], mime_type: &str) -> String {
        let id = format!("pri-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.files.lock().unwrap().insert(
            path.to_string(),
            StoredFile {
                id: id.clone(),
                bytes: bytes.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );
        id
    }

    pub fn add_dir(&self, path: &str) {
        self.dirs.lock().unwrap().push(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn id_of(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|f| f.id.clone())
    }

    /// Drop a file without going through `delete_file`
    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

#[async_trait]
impl PrimaryStore for FakePrimary {
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError> {
        let mut dirs = self.dirs.lock().unwrap();
        if !dirs.iter().any(|d| d == path) {
            dirs.push(path.to_string());
        }
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut entries: Vec<RemoteEntry> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| parent_of(p) == path)
            .map(|(p, f)| RemoteEntry {
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                kind: EntryKind::File,
                file_id: Some(f.id.clone()),
                size: f.bytes.len() as u64,
            })
            .collect();
        entries.extend(
            self.dirs
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.as_str() != path && parent_of(d) == path)
                .map(|d| RemoteEntry {
                    name: d.rsplit('/').next().unwrap_or(d).to_string(),
                    kind: EntryKind::Directory,
                    file_id: None,
                    size: 0,
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn download_file(&self, file_id: &str) -> Result<RemoteFile, RemoteError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("primary download refused".to_string()));
        }
        self.files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.id == file_id)
            .map(|f| RemoteFile {
                bytes: f.bytes.clone(),
                mime_type: Some(f.mime_type.clone()),
            })
            .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))
    }

    async fn upload_file(&self, upload: PrimaryUpload<'_>) -> Result<String, RemoteError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("primary upload refused".to_string()));
        }
        Ok(self.put(upload.path, upload.bytes, upload.mime_type))
    }

    async fn delete_file(&self, path: &str) -> Result<(), RemoteError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("primary delete refused".to_string()));
        }
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(path.to_string())),
        }
    }

    fn base_url(&self) -> &str {
        "https://files.example.com"
    }
}

/// Secondary store handing out sequential `sec-N` ids
#[derive(Default)]
pub struct FakeSecondary {
    objects: Mutex<HashMap<String, StoredFile>>,
    next_id: AtomicU64,
    /// Artificial latency per upload, used to widen race windows
    upload_delay_ms: AtomicU64,
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub fail_downloads: AtomicBool,
}

impl FakeSecondary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `n + 1`
    pub fn starting_at(n: u64) -> Self {
        let fake = Self::default();
        fake.next_id.store(n, Ordering::SeqCst);
        fake
    }

    pub fn with_upload_delay(self, delay: Duration) -> Self {
        self.upload_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn put(&self, id: &str, bytes: &[u8], mime_type: &str) {
        self.objects.lock().unwrap().insert(
            id.to_string(),
            StoredFile {
                id: id.to_string(),
                bytes: bytes.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );
    }
}

#[async_trait]
impl SecondaryStore for FakeSecondary {
    async fn upload_file(
        &self,
        upload: SecondaryUpload<'_>,
    ) -> Result<SecondaryObject, RemoteError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let delay = self.upload_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("secondary upload refused".to_string()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("sec-{}", n);
        self.put(&id, upload.bytes, upload.mime_type);
        Ok(SecondaryObject {
            id,
            reference: Some(n as i64),
        })
    }

    async fn download_file(&self, id: &str) -> Result<RemoteFile, RemoteError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("secondary download refused".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .get(id)
            .map(|f| RemoteFile {
                bytes: f.bytes.clone(),
                mime_type: Some(f.mime_type.clone()),
            })
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }
}
