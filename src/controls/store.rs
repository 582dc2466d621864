use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::{parse_control_set, ControlSet};
use crate::error::{AppError, Result};

/// Control store backed by a single JSON document
///
/// Uses `ArcSwap` for lock-free reads; writers are serialized by an async
/// mutex and the cache is swapped only after the document hit the disk.
pub struct ControlStore {
    path: PathBuf,
    /// Lock-free cache of the last persisted map
    cache: ArcSwap<ControlSet>,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl ControlStore {
    /// Load the control document at `path`.
    ///
    /// A missing file yields an empty map.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let controls = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
                    AppError::Storage(format!("{} is not valid JSON: {}", path.display(), e))
                })?;
                let controls = parse_control_set(value).map_err(|e| {
                    AppError::Storage(format!("{} is not a control map: {}", path.display(), e))
                })?;
                info!(
                    "Loaded {} controls from {}: {:?}",
                    controls.len(),
                    path.display(),
                    controls
                );
                controls
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "{} not found, starting with no stored controls",
                    path.display()
                );
                ControlSet::new()
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            cache: ArcSwap::from_pointee(controls),
            write_lock: Mutex::new(()),
        })
    }

    /// Get current controls (lock-free, zero-copy)
    pub fn current(&self) -> Arc<ControlSet> {
        self.cache.load_full()
    }

    /// Location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge `partial` over the stored controls and persist the result.
    ///
    /// The new map is written in full before the cache is swapped, so a
    /// failed write leaves both disk and memory at the previous state.
    pub async fn merge(&self, partial: ControlSet) -> Result<Arc<ControlSet>> {
        if partial.is_empty() {
            return Err(AppError::Validation(
                "control update must contain at least one control".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let mut merged = (*self.cache.load_full()).clone();
        merged.extend(partial);

        self.persist(&merged).await?;

        let merged = Arc::new(merged);
        self.cache.store(merged.clone());
        info!("Updated controls: {:?}", merged);

        Ok(merged)
    }

    /// Write and sync the document next to its final location, then rename
    /// over it
    async fn persist(&self, controls: &ControlSet) -> Result<()> {
        let json = serde_json::to_vec(controls)?;
        let tmp_path = self.path.with_extension("json.tmp");

        if let Err(e) = write_synced(&tmp_path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AppError::Storage(format!(
                "Failed to write {}: {}",
                tmp_path.display(),
                e
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AppError::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!("Saved {} controls to {}", controls.len(), self.path.display());
        Ok(())
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlValue;
    use tempfile::tempdir;

    fn controls(pairs: &[(&str, ControlValue)]) -> ControlSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = ControlStore::load(dir.path().join("default.json"))
            .await
            .unwrap();
        assert!(store.current().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.json");
        std::fs::write(&path, b"[1, 2").unwrap();

        let err = ControlStore::load(&path).await.err().unwrap();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn test_sequential_merges_union_with_later_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.json");
        let store = ControlStore::load(&path).await.unwrap();

        store
            .merge(controls(&[
                ("FrameRate", 15i64.into()),
                ("AwbEnable", false.into()),
            ]))
            .await
            .unwrap();
        let merged = store
            .merge(controls(&[
                ("FrameRate", 30i64.into()),
                ("Brightness", 0.2f64.into()),
            ]))
            .await
            .unwrap();

        let expected = controls(&[
            ("AwbEnable", false.into()),
            ("Brightness", 0.2f64.into()),
            ("FrameRate", 30i64.into()),
        ]);
        assert_eq!(*merged, expected);
        assert_eq!(*store.current(), expected);

        // Persisted document matches and survives a reload
        let reloaded = ControlStore::load(&path).await.unwrap();
        assert_eq!(*reloaded.current(), expected);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_merge_replaces_leftover_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.json");
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, b"{\"Stale\": 1, \"Trunc").unwrap();

        let store = ControlStore::load(&path).await.unwrap();
        store
            .merge(controls(&[("FrameRate", 30i64.into())]))
            .await
            .unwrap();

        assert!(!tmp_path.exists());
        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({"FrameRate": 30}));
    }

    #[tokio::test]
    async fn test_empty_merge_is_rejected_without_touching_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.json");
        let store = ControlStore::load(&path).await.unwrap();

        let err = store.merge(ControlSet::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_previous_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("default.json");
        let store = ControlStore::load(&path).await.unwrap();

        let err = store
            .merge(controls(&[("FrameRate", 30i64.into())]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(store.current().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_no_keys() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            ControlStore::load(dir.path().join("default.json"))
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for i in 0..16i64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .merge(controls(&[(format!("Control{}", i).as_str(), i.into())]))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.current().len(), 16);
        let reloaded = ControlStore::load(store.path()).await.unwrap();
        assert_eq!(reloaded.current().len(), 16);
    }
}
