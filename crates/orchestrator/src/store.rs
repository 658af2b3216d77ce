//! Local persistence for in-progress orders.
//!
//! [`FileStore`] keeps one JSON document per order under `orders/`, an
//! `index.json` listing every order id it has seen (the history view), and a
//! `session.json` naming the order currently being composed. Writes go to a
//! temporary file first and are renamed into place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use huggnote_core::record::OrderRecord;
use huggnote_core::types::OrderId;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Local store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local store holds malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load(&self, id: &OrderId) -> Result<Option<OrderRecord>, StoreError>;

    /// Persist the record and add its id to the history index.
    async fn save(&self, record: &OrderRecord) -> Result<(), StoreError>;

    /// Known order ids, oldest first.
    async fn history(&self) -> Result<Vec<OrderId>, StoreError>;

    async fn current_order(&self) -> Result<Option<OrderId>, StoreError>;

    async fn set_current_order(&self, id: &OrderId) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    current_order: Option<OrderId>,
}

pub struct FileStore {
    root: PathBuf,
    /// Serializes index read-modify-write cycles.
    index_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("orders")).await?;
        Ok(Self {
            root,
            index_lock: Mutex::new(()),
        })
    }

    fn order_path(&self, id: &OrderId) -> PathBuf {
        self.root
            .join("orders")
            .join(format!("{}.json", file_stem(id.as_str())))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }
}

/// Order ids become file names. Bytes outside `[A-Za-z0-9-]` are written
/// as `%XX`, so distinct ids never share a file and none can leave the
/// store directory.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load(&self, id: &OrderId) -> Result<Option<OrderRecord>, StoreError> {
        read_json(&self.order_path(id)).await
    }

    async fn save(&self, record: &OrderRecord) -> Result<(), StoreError> {
        write_json_atomic(&self.order_path(&record.id), record).await?;

        let _guard = self.index_lock.lock().await;
        let mut index: Vec<OrderId> = read_json(&self.index_path()).await?.unwrap_or_default();
        if !index.contains(&record.id) {
            index.push(record.id.clone());
            write_json_atomic(&self.index_path(), &index).await?;
        }
        Ok(())
    }

    async fn history(&self) -> Result<Vec<OrderId>, StoreError> {
        Ok(read_json(&self.index_path()).await?.unwrap_or_default())
    }

    async fn current_order(&self) -> Result<Option<OrderId>, StoreError> {
        let session: Option<SessionFile> = read_json(&self.session_path()).await?;
        Ok(session.and_then(|s| s.current_order))
    }

    async fn set_current_order(&self, id: &OrderId) -> Result<(), StoreError> {
        let session = SessionFile {
            current_order: Some(id.clone()),
        };
        write_json_atomic(&self.session_path(), &session).await
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<OrderId, OrderRecord>,
    index: Vec<OrderId>,
    current: Option<OrderId>,
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load(&self, id: &OrderId) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.inner.lock().await.records.get(id).cloned())
    }

    async fn save(&self, record: &OrderRecord) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if !state.index.contains(&record.id) {
            state.index.push(record.id.clone());
        }
        state.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn history(&self) -> Result<Vec<OrderId>, StoreError> {
        Ok(self.inner.lock().await.index.clone())
    }

    async fn current_order(&self) -> Result<Option<OrderId>, StoreError> {
        Ok(self.inner.lock().await.current.clone())
    }

    async fn set_current_order(&self, id: &OrderId) -> Result<(), StoreError> {
        self.inner.lock().await.current = Some(id.clone());
        Ok(())
    }
}
