//! Device store persisted as a JSON document
//!
//! Mutations update the in-memory document and hand a snapshot to a writer
//! thread, so the orchestrator task never waits on the disk. Each snapshot
//! replaces the file through a temporary file in the same directory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use twophone_core::{DeviceId, DeviceStore, StoreError};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct StoreDocument {
    identities: BTreeMap<String, String>,
    known_devices: Vec<String>,
}

#[derive(Debug)]
enum WriteRequest {
    Save(StoreDocument),
    Flush(mpsc::Sender<Result<(), StoreError>>),
}

/// [`DeviceStore`] backed by a single JSON file
#[derive(Debug)]
pub struct JsonFileDeviceStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
    writer: Option<mpsc::Sender<WriteRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl JsonFileDeviceStore {
    /// Open `path`, starting empty if the file does not exist yet
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let document = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| StoreError::Unavailable {
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;
            serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                reason: format!("{}: {}", path.display(), e),
            })?
        } else {
            StoreDocument::default()
        };

        let (writer, requests) = mpsc::channel();
        let target = path.clone();
        let worker = std::thread::Builder::new()
            .name("twophone-store".to_string())
            .spawn(move || run_writer(target, requests))
            .map_err(|e| StoreError::Unavailable {
                reason: format!("failed to start store writer: {e}"),
            })?;

        debug!(path = %path.display(), known = document.known_devices.len(), "opened device store");
        Ok(Self {
            path,
            document: Mutex::new(document),
            writer: Some(writer),
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of platform identifiers with an identity token
    pub fn identity_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.identities.len())
    }

    /// Block until every earlier mutation is on disk
    ///
    /// Reports the first write failure since the previous flush.
    pub fn flush(&self) -> Result<(), StoreError> {
        let (ack, done) = mpsc::channel();
        self.request(WriteRequest::Flush(ack))?;
        done.recv().map_err(|_| writer_stopped())?
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreDocument>, StoreError> {
        self.document.lock().map_err(|_| StoreError::Unavailable {
            reason: "store lock poisoned".to_string(),
        })
    }

    /// Queue a snapshot; called with the document lock held so snapshots stay ordered
    fn persist(&self, document: &StoreDocument) -> Result<(), StoreError> {
        self.request(WriteRequest::Save(document.clone()))
    }

    fn request(&self, request: WriteRequest) -> Result<(), StoreError> {
        self.writer
            .as_ref()
            .ok_or_else(writer_stopped)?
            .send(request)
            .map_err(|_| writer_stopped())
    }
}

impl Drop for JsonFileDeviceStore {
    fn drop(&mut self) {
        // Closing the channel lets the writer finish the queue and exit
        self.writer.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(path = %self.path.display(), "device store writer panicked");
            }
        }
    }
}

impl DeviceStore for JsonFileDeviceStore {
    fn get_device_identity(&self, device: &DeviceId) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.identities.get(device.as_str()).cloned())
    }

    fn set_device_identity(&self, device: &DeviceId, token: &str) -> Result<(), StoreError> {
        let mut document = self.lock()?;
        document
            .identities
            .insert(device.as_str().to_string(), token.to_string());
        self.persist(&document)
    }

    fn list_known_device_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.known_devices.clone())
    }

    fn add_known_device_name(&self, name: &str) -> Result<(), StoreError> {
        let mut document = self.lock()?;
        if document.known_devices.iter().any(|known| known == name) {
            return Ok(());
        }
        document.known_devices.push(name.to_string());
        self.persist(&document)
    }

    fn remove_known_device_name(&self, name: &str) -> Result<(), StoreError> {
        let mut document = self.lock()?;
        let before = document.known_devices.len();
        document.known_devices.retain(|known| known != name);
        if document.known_devices.len() == before {
            return Ok(());
        }
        self.persist(&document)
    }
}

// ----------------------------------------------------------------------------
// Writer Thread
// ----------------------------------------------------------------------------

fn writer_stopped() -> StoreError {
    StoreError::Unavailable {
        reason: "store writer stopped".to_string(),
    }
}

fn run_writer(path: PathBuf, requests: mpsc::Receiver<WriteRequest>) {
    let mut failure: Option<StoreError> = None;

    while let Ok(request) = requests.recv() {
        let mut document = match request {
            WriteRequest::Save(document) => document,
            WriteRequest::Flush(ack) => {
                let _ = ack.send(failure.take().map_or(Ok(()), Err));
                continue;
            }
        };

        // Only the newest queued snapshot needs writing
        let mut flushes = Vec::new();
        while let Ok(next) = requests.try_recv() {
            match next {
                WriteRequest::Save(newer) => document = newer,
                WriteRequest::Flush(ack) => {
                    flushes.push(ack);
                    break;
                }
            }
        }

        if let Err(e) = write_document(&path, &document) {
            warn!(path = %path.display(), error = %e, "failed to persist device store");
            failure.get_or_insert(e);
        }
        for ack in flushes {
            let _ = ack.send(failure.take().map_or(Ok(()), Err));
        }
    }
}

fn write_document(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    let unavailable = |e: std::io::Error| StoreError::Unavailable {
        reason: format!("failed to write {}: {}", path.display(), e),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(unavailable)?;

    let contents = serde_json::to_vec_pretty(document).map_err(|e| StoreError::Corrupt {
        reason: e.to_string(),
    })?;
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(unavailable)?;
    file.write_all(&contents).map_err(unavailable)?;
    file.as_file().sync_all().map_err(unavailable)?;
    file.persist(path).map_err(|e| unavailable(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use twophone_core::DeviceIdentity;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileDeviceStore {
        JsonFileDeviceStore::open(dir.path().join("nested").join("devices.json")).unwrap()
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.list_known_device_names().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_known_devices_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add_known_device_name("Pixel 8").unwrap();
        store.add_known_device_name("Galaxy").unwrap();
        store.add_known_device_name("Pixel 8").unwrap();
        store.remove_known_device_name("Nobody").unwrap();
        store.flush().unwrap();

        let reopened = JsonFileDeviceStore::open(store.path()).unwrap();
        assert_eq!(
            reopened.list_known_device_names().unwrap(),
            vec!["Pixel 8", "Galaxy"]
        );

        reopened.remove_known_device_name("Pixel 8").unwrap();
        drop(reopened);
        let reopened = JsonFileDeviceStore::open(store.path()).unwrap();
        assert_eq!(reopened.list_known_device_names().unwrap(), vec!["Galaxy"]);
    }

    #[test]
    fn test_identity_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let device = DeviceId::new("AA:BB:CC:DD:EE:FF");

        let first = DeviceIdentity::resolve(&store, &device).unwrap();
        store.flush().unwrap();
        let reopened = JsonFileDeviceStore::open(store.path()).unwrap();
        let second = DeviceIdentity::resolve(&reopened, &device).unwrap();

        assert_eq!(first, second);
        assert_eq!(reopened.identity_count().unwrap(), 1);
    }

    #[test]
    fn test_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .set_device_identity(&DeviceId::new("peripheral-1"), "TOKEN")
            .unwrap();
        store.add_known_device_name("Pixel 8").unwrap();
        store.flush().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["identities"]["peripheral-1"], "TOKEN");
        assert_eq!(raw["known_devices"][0], "Pixel 8");
    }

    #[test]
    fn test_writes_replace_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let store = JsonFileDeviceStore::open(&path).unwrap();
        for name in ["A", "B", "C"] {
            store.add_known_device_name(name).unwrap();
        }
        store.remove_known_device_name("B").unwrap();
        store.flush().unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("devices.json")]);

        let reopened = JsonFileDeviceStore::open(&path).unwrap();
        assert_eq!(reopened.list_known_device_names().unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn test_write_failure_reported_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let store = JsonFileDeviceStore::open(blocker.join("devices.json")).unwrap();

        store.add_known_device_name("Pixel 8").unwrap();
        assert_eq!(store.list_known_device_names().unwrap(), vec!["Pixel 8"]);
        assert!(matches!(store.flush(), Err(StoreError::Unavailable { .. })));
        assert!(store.flush().is_ok());
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonFileDeviceStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
