//! Per-device model cache backed by a persistent repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ForestModel, ModelMetadata, Predictor};
use crate::error::{IrrigationError, IrrigationResult};

/// Durable storage of serialized models, one blob per device.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Inserts or replaces the blob of a device.
    async fn save(&self, device_id: Uuid, blob: Vec<u8>) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<(Uuid, Vec<u8>)>>;
}

#[derive(Default)]
pub struct InMemoryModelRepository {
    blobs: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn save(&self, device_id: Uuid, blob: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(device_id, blob);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(Uuid, Vec<u8>)>> {
        Ok(self
            .blobs
            .read()
            .iter()
            .map(|(id, blob)| (*id, blob.clone()))
            .collect())
    }
}

/// Stores each model as `<device-id>.bin` in one directory.
pub struct FileModelRepository {
    dir: PathBuf,
}

impl FileModelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, device_id: Uuid) -> PathBuf {
        self.dir.join(format!("{device_id}.bin"))
    }
}

#[async_trait]
impl ModelRepository for FileModelRepository {
    async fn save(&self, device_id: Uuid, blob: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create model dir {}", self.dir.display()))?;

        // atomic replace
        let path = self.path_for(device_id);
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &blob)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move model into {}", path.display()))?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(Uuid, Vec<u8>)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.dir.display()))
            }
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let Some(device_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                warn!(path = %path.display(), "ignoring model file without a device id name");
                continue;
            };
            let blob = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            blobs.push((device_id, blob));
        }
        Ok(blobs)
    }
}

/// Current model of every trained device.
///
/// The lock only guards handle lookups and swaps; fitting and predicting
/// happen on cloned `Arc` handles outside of it. Saves of one device are
/// serialized so the persisted blob and the cached handle always agree.
pub struct ModelStore {
    repo: Arc<dyn ModelRepository>,
    models: RwLock<HashMap<Uuid, Arc<dyn Predictor>>>,
    save_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ModelStore {
    pub fn new(repo: Arc<dyn ModelRepository>) -> Self {
        Self {
            repo,
            models: RwLock::new(HashMap::new()),
            save_locks: Mutex::new(HashMap::new()),
        }
    }

    fn save_lock(&self, device_id: Uuid) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.save_locks.lock().entry(device_id).or_default())
    }

    /// Persists the model and makes it the device's current one.
    pub async fn save(&self, device_id: Uuid, model: ForestModel) -> IrrigationResult<Arc<dyn Predictor>> {
        let blob = model.to_bytes().map_err(IrrigationError::model)?;

        // held across the write and the swap
        let lock = self.save_lock(device_id);
        let _guard = lock.lock().await;
        self.repo
            .save(device_id, blob)
            .await
            .map_err(|e| IrrigationError::storage(e.context(format!("saving model of device {device_id}"))))?;

        let handle: Arc<dyn Predictor> = Arc::new(model);
        self.models.write().insert(device_id, Arc::clone(&handle));
        info!(%device_id, model_id = %handle.metadata().model_id, "model stored");
        Ok(handle)
    }

    /// Startup load of every persisted model. Undecodable or stale models
    /// are skipped. Returns the number of models loaded.
    pub async fn load_all(&self) -> IrrigationResult<usize> {
        let blobs = self
            .repo
            .load_all()
            .await
            .map_err(|e| IrrigationError::storage(e.context("loading persisted models")))?;

        let mut loaded = HashMap::new();
        for (device_id, blob) in blobs {
            match ForestModel::from_bytes(&blob) {
                Ok(model) => {
                    loaded.insert(device_id, Arc::new(model) as Arc<dyn Predictor>);
                }
                Err(e) => warn!(%device_id, error = %format!("{e:#}"), "skipping persisted model; retraining required"),
            }
        }

        let count = loaded.len();
        self.models.write().extend(loaded);
        info!(models = count, "persisted models loaded");
        Ok(count)
    }

    pub fn get(&self, device_id: Uuid) -> IrrigationResult<Arc<dyn Predictor>> {
        self.models
            .read()
            .get(&device_id)
            .cloned()
            .ok_or(IrrigationError::ModelNotFound(device_id))
    }

    pub fn metadata(&self, device_id: Uuid) -> IrrigationResult<ModelMetadata> {
        Ok(self.get(device_id)?.metadata().clone())
    }

    pub fn contains(&self, device_id: Uuid) -> bool {
        self.models.read().contains_key(&device_id)
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{ForestParams, FEATURE_COUNT};
    use chrono::Utc;

    fn model(device_id: Uuid, level: f64) -> ForestModel {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[2] = i as f64;
                row
            })
            .collect();
        let y = vec![level; 20];
        let params = ForestParams {
            n_trees: 5,
            ..ForestParams::default()
        };
        ForestModel::fit(device_id, &x, &y, params, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_save_replaces_current_model() {
        let store = ModelStore::new(Arc::new(InMemoryModelRepository::new()));
        let device_id = Uuid::new_v4();
        assert!(matches!(
            store.get(device_id),
            Err(IrrigationError::ModelNotFound(id)) if id == device_id
        ));

        let first = store.save(device_id, model(device_id, 5.0)).await.unwrap();
        let second = store.save(device_id, model(device_id, 9.0)).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_ne!(first.metadata().model_id, second.metadata().model_id);
        assert_eq!(
            store.metadata(device_id).unwrap().model_id,
            second.metadata().model_id
        );
    }

    /// Stalls the first write so a later save can overtake it.
    struct StallingRepository {
        inner: InMemoryModelRepository,
        stalled: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ModelRepository for StallingRepository {
        async fn save(&self, device_id: Uuid, blob: Vec<u8>) -> Result<()> {
            self.inner.save(device_id, blob).await?;
            if !self.stalled.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Ok(())
        }

        async fn load_all(&self) -> Result<Vec<(Uuid, Vec<u8>)>> {
            self.inner.load_all().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_cache_and_storage_aligned() {
        let repo = Arc::new(StallingRepository {
            inner: InMemoryModelRepository::new(),
            stalled: std::sync::atomic::AtomicBool::new(false),
        });
        let store = Arc::new(ModelStore::new(repo.clone()));
        let device_id = Uuid::new_v4();

        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(device_id, model(device_id, 2.0)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save(device_id, model(device_id, 8.0)).await })
        };
        first.await.unwrap().unwrap();
        let last = second.await.unwrap().unwrap();

        let cached = store.metadata(device_id).unwrap().model_id;
        let reloaded = ModelStore::new(repo);
        reloaded.load_all().await.unwrap();
        let persisted = reloaded.metadata(device_id).unwrap().model_id;

        assert_eq!(cached, persisted);
        assert_eq!(cached, last.metadata().model_id);
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_blobs() {
        let repo = Arc::new(InMemoryModelRepository::new());
        let good = Uuid::new_v4();
        repo.save(good, model(good, 3.0).to_bytes().unwrap()).await.unwrap();
        repo.save(Uuid::new_v4(), b"garbage".to_vec()).await.unwrap();

        let store = ModelStore::new(repo);
        assert_eq!(store.load_all().await.unwrap(), 1);
        assert!(store.contains(good));
    }

    #[tokio::test]
    async fn test_file_repository_roundtrip() {
        let dir = std::env::temp_dir().join(format!("irrigation-models-{}", Uuid::new_v4()));
        let repo = FileModelRepository::new(&dir);
        assert!(repo.load_all().await.unwrap().is_empty());

        let device_id = Uuid::new_v4();
        repo.save(device_id, vec![1, 2, 3]).await.unwrap();
        repo.save(device_id, vec![4, 5]).await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), b"x").await.unwrap();

        let blobs = repo.load_all().await.unwrap();
        assert_eq!(blobs, vec![(device_id, vec![4, 5])]);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
