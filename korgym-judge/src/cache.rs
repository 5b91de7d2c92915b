//! # Experience Cache
//!
//! Experiences saved per `(experiment, step)` so a training run can resume
//! or replay a step. Entries live in a key-value [`StorageBackend`] under
//! `"{experiment}:step_{step}"`.

use chrono::Utc;
use korgym_core::Experience;
use korgym_error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key-value storage for JSON values
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
    fn exists(&self, key: &str) -> bool;
    fn keys(&self) -> Vec<String>;
}

/// Volatile storage, used by tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: HashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

/// One JSON file per key.
///
/// File names are escaped keys: ASCII letters, digits, `-`, `.` and `_` and
/// non-ASCII characters are kept, every other byte becomes `%XX`. Each file
/// also stores its original key (`{"key": ..., "value": ...}`), so `keys()`
/// reports the real names and `set` refuses to overwrite a file that holds a
/// different key (case-insensitive file systems).
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            Error::storage_failed(format!("cannot create cache dir {}", base_path.display()))
                .set_source(e)
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        let mut safe_key = String::with_capacity(key.len());
        for c in key.chars() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') || !c.is_ascii() {
                safe_key.push(c);
            } else {
                safe_key.push_str(&format!("%{:02X}", c as u8));
            }
        }
        self.base_path.join(format!("{}.json", safe_key))
    }

    fn read_envelope(path: &Path) -> Option<(String, Value)> {
        let content = fs::read_to_string(path).ok()?;
        let mut envelope: Value = serde_json::from_str(&content).ok()?;
        let key = envelope.get("key")?.as_str()?.to_string();
        let value = envelope.get_mut("value")?.take();
        Some((key, value))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<Value> {
        let (stored_key, value) = Self::read_envelope(&self.key_to_path(key))?;
        (stored_key == key).then_some(value)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path = self.key_to_path(key);
        if let Some((stored_key, _)) = Self::read_envelope(&path) {
            if stored_key != key {
                return Err(Error::storage_failed(format!(
                    "{} already holds key {:?}",
                    path.display(),
                    stored_key
                ))
                .with_context("key", key));
            }
        }
        let content = serde_json::to_string_pretty(&json!({ "key": key, "value": value }))
            .map_err(|e| Error::serialization_failed(e.to_string()).set_source(e))?;
        fs::write(&path, content).map_err(|e| {
            Error::storage_failed(format!("cannot write {}", path.display())).set_source(e)
        })
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.key_to_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                Error::storage_failed(format!("cannot delete {}", path.display())).set_source(e)
            })?;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        fs::read_dir(&self.base_path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
                    .filter_map(|path| Self::read_envelope(&path).map(|(key, _)| key))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Outcome of [`ExperienceCache::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Created,
    Replaced,
}

impl Saved {
    pub fn is_created(self) -> bool {
        self == Saved::Created
    }
}

/// A stored step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub experiences: Vec<Experience>,
    pub epoch: Option<u32>,
    pub batch: Option<u32>,
    /// RFC 3339, UTC
    pub saved_at: String,
}

pub struct ExperienceCache {
    backend: Box<dyn StorageBackend>,
}

impl ExperienceCache {
    pub fn memory() -> Self {
        Self::with_backend(MemoryStorage::new())
    }

    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_backend(FileStorage::new(path)?))
    }

    pub fn with_backend(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    fn key(experiment: &str, step: u64) -> String {
        format!("{}:step_{}", experiment, step)
    }

    fn prefix(experiment: &str) -> String {
        format!("{}:step_", experiment)
    }

    /// Store the experiences of one step, replacing any earlier entry.
    ///
    /// Reports whether the step was new or an earlier entry was replaced.
    pub fn save(
        &mut self,
        experiment: &str,
        step: u64,
        experiences: &[Experience],
        epoch: Option<u32>,
        batch: Option<u32>,
    ) -> Result<Saved> {
        if experiment.trim().is_empty() {
            return Err(Error::invalid_argument("experiment name must not be empty")
                .with_operation("cache::save"));
        }

        let key = Self::key(experiment, step);
        let saved = if self.backend.exists(&key) {
            Saved::Replaced
        } else {
            Saved::Created
        };
        let entry = CacheEntry {
            experiences: experiences.to_vec(),
            epoch,
            batch,
            saved_at: Utc::now().to_rfc3339(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| Error::serialization_failed(e.to_string()).set_source(e))?;

        self.backend
            .set(&key, value)
            .map_err(|e| e.with_operation("cache::save").with_context("key", key.clone()))?;

        debug!(experiment, step, count = experiences.len(), ?saved, "experiences cached");
        Ok(saved)
    }

    pub fn entry(&self, experiment: &str, step: u64) -> Option<CacheEntry> {
        let value = self.backend.get(&Self::key(experiment, step))?;
        serde_json::from_value(value).ok()
    }

    pub fn load(&self, experiment: &str, step: u64) -> Option<Vec<Experience>> {
        self.entry(experiment, step).map(|entry| entry.experiences)
    }

    pub fn exists(&self, experiment: &str, step: u64) -> bool {
        self.backend.exists(&Self::key(experiment, step))
    }

    /// Cached steps of `experiment`, ascending
    pub fn steps(&self, experiment: &str) -> Vec<u64> {
        let prefix = Self::prefix(experiment);
        let mut steps: Vec<u64> = self
            .backend
            .keys()
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|s| s.parse().ok())
            .collect();
        steps.sort_unstable();
        steps
    }

    /// Drop every step of `experiment`. Returns `true` if anything was deleted.
    pub fn delete_all(&mut self, experiment: &str) -> Result<bool> {
        let steps = self.steps(experiment);
        for step in &steps {
            let key = Self::key(experiment, *step);
            self.backend
                .delete(&key)
                .map_err(|e| e.with_operation("cache::delete_all").with_context("key", key.clone()))?;
        }
        Ok(!steps.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lessons() -> Vec<Experience> {
        vec![
            Experience::new("corner", "keep the big tile in a corner"),
            Experience::new("no up", "avoid moving up"),
        ]
    }

    fn exercise(mut cache: ExperienceCache) {
        assert!(!cache.exists("grpo-2048", 1));
        assert!(cache.load("grpo-2048", 1).is_none());

        assert_eq!(cache.save("grpo-2048", 1, &lessons(), Some(0), Some(3)).unwrap(), Saved::Created);
        assert_eq!(cache.save("grpo-2048", 2, &lessons()[..1], None, None).unwrap(), Saved::Created);
        assert_eq!(cache.save("grpo-2048", 2, &lessons(), None, None).unwrap(), Saved::Replaced);
        cache.save("other", 1, &[], None, None).unwrap();

        assert!(cache.exists("grpo-2048", 1));
        assert_eq!(cache.load("grpo-2048", 1).unwrap(), lessons());
        assert_eq!(cache.load("grpo-2048", 2).unwrap().len(), 2);
        let entry = cache.entry("grpo-2048", 1).unwrap();
        assert_eq!((entry.epoch, entry.batch), (Some(0), Some(3)));
        assert_eq!(cache.steps("grpo-2048"), vec![1, 2]);

        assert!(cache.delete_all("grpo-2048").unwrap());
        assert!(!cache.delete_all("grpo-2048").unwrap());
        assert!(!cache.exists("grpo-2048", 1));
        assert!(cache.exists("other", 1));
    }

    #[test]
    fn test_memory_cache() {
        exercise(ExperienceCache::memory());
    }

    #[test]
    fn test_file_cache() {
        let dir = tempfile::tempdir().unwrap();
        exercise(ExperienceCache::file(dir.path().join("cache")).unwrap());
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ExperienceCache::file(dir.path()).unwrap();
        cache.save("exp/a", 7, &lessons(), None, None).unwrap();
        drop(cache);

        let cache = ExperienceCache::file(dir.path()).unwrap();
        assert_eq!(cache.steps("exp/a"), vec![7]);
        assert_eq!(cache.load("exp/a", 7).unwrap(), lessons());
    }

    #[test]
    fn test_file_storage_keeps_escaped_keys_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.set("a/b", json!(1)).unwrap();

        assert_eq!(storage.get("a/b"), Some(json!(1)));
        assert_eq!(storage.get("a_b"), None);
        assert!(!storage.exists("a_b"));
        assert_eq!(storage.keys(), vec!["a/b".to_string()]);
    }

    #[test]
    fn test_file_cache_keeps_lookalike_experiments_apart() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ExperienceCache::file(dir.path()).unwrap();

        let slash = cache.save("exp/a", 1, &lessons(), None, None).unwrap();
        let underscore = cache.save("exp_a", 1, &lessons()[..1], None, None).unwrap();
        assert_eq!((slash, underscore), (Saved::Created, Saved::Created));

        assert_eq!(cache.load("exp/a", 1).unwrap(), lessons());
        assert_eq!(cache.load("exp_a", 1).unwrap(), lessons()[..1].to_vec());
        assert_eq!(cache.steps("exp/a"), vec![1]);
        assert_eq!(cache.steps("exp_a"), vec![1]);

        assert!(cache.delete_all("exp_a").unwrap());
        assert_eq!(cache.load("exp/a", 1).unwrap(), lessons());
    }

    #[test]
    fn test_file_storage_refuses_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        let path = storage.key_to_path("a");
        fs::write(&path, json!({"key": "A", "value": 1}).to_string()).unwrap();

        let err = storage.set("a", json!(2)).unwrap_err();
        assert_eq!(err.kind(), korgym_error::ErrorKind::StorageFailed);
        assert_eq!(FileStorage::read_envelope(&path), Some(("A".to_string(), json!(1))));
        assert_eq!(storage.get("a"), None);
    }

    #[test]
    fn test_empty_experiment_rejected() {
        let mut cache = ExperienceCache::memory();
        let err = cache.save("  ", 1, &lessons(), None, None).unwrap_err();
        assert_eq!(err.kind(), korgym_error::ErrorKind::InvalidArgument);
    }
}
