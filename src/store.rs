//! Key-value persistence for the two JSON documents the bot keeps.
//!
//! The stores above this layer only ever see [`KvStore`]; tests plug in an
//! in-memory implementation that also counts writes.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

/// Document holding subscribers and their filters.
pub const DATA_KEY: &str = "data";
/// Document holding the feed root and the seen-listing set.
pub const SEEN_KEY: &str = "sslv";

/// Persistence boundary: whole JSON documents addressed by key.
pub trait KvStore: Send + Sync {
    /// Load a document; `Ok(None)` when it has never been saved.
    fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a document.
    fn save(&self, key: &str, value: &Value) -> Result<()>;
}

/// Save `value` on the blocking pool.  Callers hold their document lock
/// across the await, so writes to one key stay in order.
pub async fn persist(store: &Arc<dyn KvStore>, key: &'static str, value: Value) -> Result<()> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.save(key, &value))
        .await
        .context("persistence task failed")?
}

/// Stores each document as `<dir>/<key>.json`.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path(key);
        // Write next to the target and rename so a crash never leaves a
        // half-written document behind.
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            serde_json::to_writer_pretty(&mut file, value)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
