// ── Persistent device store ──
//
// Durable `id -> DeviceRecord` map backed by a single JSON file. The
// whole file is mirrored in memory at open; every mutation rewrites it
// atomically (tmp + rename). Expired entries are pruned lazily on each
// read, never by a background timer.
//
// I/O failures never escape as fatal: the in-memory mirror is always
// updated, and the failure is returned as a `PersistenceError` for the
// caller to report. The first failure per store logs at warn, later
// ones at debug.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::model::{DeviceKind, DeviceRecord, RecordSource};

const STATE_VERSION: u32 = 1;

// ── On-disk format ───────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    devices: BTreeMap<String, StoredDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDevice {
    host: String,
    port: u16,
    kind: DeviceKind,
    #[serde(default = "default_number")]
    number: u32,
    display_name: String,
    discovered_at: DateTime<Utc>,
}

fn default_number() -> u32 {
    1
}

impl StoredDevice {
    fn into_record(self, id: String) -> DeviceRecord {
        DeviceRecord {
            id,
            kind: self.kind,
            number: self.number,
            host: self.host,
            port: self.port,
            display_name: self.display_name,
            discovered_at: self.discovered_at,
            source: RecordSource::Persisted,
        }
    }
}

impl From<&DeviceRecord> for StoredDevice {
    fn from(r: &DeviceRecord) -> Self {
        Self {
            host: r.host.clone(),
            port: r.port,
            kind: r.kind,
            number: r.number,
            display_name: r.display_name.clone(),
            discovered_at: r.discovered_at,
        }
    }
}

// ── DeviceStore ──────────────────────────────────────────────────

/// Durable map of previously connected devices, with expiry.
pub struct DeviceStore {
    path: Option<PathBuf>,
    max_age: chrono::Duration,
    records: Mutex<BTreeMap<String, StoredDevice>>,
    /// Serializes file rewrites so concurrent flushes never interleave.
    write_lock: tokio::sync::Mutex<()>,
    warned: AtomicBool,
}

impl DeviceStore {
    /// Open the store at `path`, loading whatever is on disk.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// reported once and treated as empty. `None` keeps everything in memory.
    pub async fn open(path: Option<PathBuf>, max_age: Duration) -> Self {
        let store = Self {
            path,
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX),
            records: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            warned: AtomicBool::new(false),
        };

        if let Some(ref path) = store.path {
            match load(path).await {
                Ok(devices) => {
                    debug!(path = %path.display(), count = devices.len(), "loaded device store");
                    *store.lock() = devices;
                }
                Err(e) => store.report(&e),
            }
        }

        store
    }

    /// In-memory store with the given expiry.
    pub fn in_memory(max_age: Duration) -> Self {
        Self {
            path: None,
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX),
            records: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            warned: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up an unexpired record.
    pub async fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.prune().await;
        self.lock()
            .get(id)
            .cloned()
            .map(|d| d.into_record(id.to_owned()))
    }

    /// All unexpired records, ordered by id.
    pub async fn list(&self) -> Vec<DeviceRecord> {
        self.prune().await;
        self.lock()
            .iter()
            .map(|(id, d)| d.clone().into_record(id.clone()))
            .collect()
    }

    /// Insert or overwrite a record.
    pub async fn put(&self, record: &DeviceRecord) -> Result<(), PersistenceError> {
        self.lock()
            .insert(record.id.clone(), StoredDevice::from(record));
        self.flush().await
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.lock().clear();
        self.flush().await
    }

    /// Drop expired records. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let cutoff = Utc::now()
            .checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed = {
            let mut records = self.lock();
            let before = records.len();
            records.retain(|_, d| d.discovered_at >= cutoff);
            before - records.len()
        };

        if removed > 0 {
            debug!(removed, "pruned expired device records");
            // Failure is reported inside flush; the in-memory view is already correct.
            let _ = self.flush().await;
        }
        removed
    }

    // ── Internals ────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredDevice>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let snapshot = StateFile {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            devices: self.lock().clone(),
        };

        let result = write_atomic(path, &snapshot).await;
        if let Err(ref e) = result {
            self.report(e);
        }
        result
    }

    fn report(&self, err: &PersistenceError) {
        if self.warned.swap(true, Ordering::Relaxed) {
            debug!(error = %err, "device store still degraded to memory-only");
        } else {
            warn!(error = %err, "device store unavailable; continuing in memory only");
        }
    }
}

async fn load(path: &Path) -> Result<BTreeMap<String, StoredDevice>, PersistenceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let state: StateFile =
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(state.devices)
}

async fn write_atomic(path: &Path, state: &StateFile) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let body = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
