//! Derived asset cache.
//!
//! Transformed copies of photos live at `{cache_dir}/{asset_id}.jpg`, each
//! carrying the transform identity it was generated from. A copy whose
//! recorded identity matches the current descriptor is served as-is;
//! anything else is regenerated, at most once concurrently per asset id.

pub mod marker;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::AssetRow;
use crate::error::{Error, Result};
use crate::transform::{TransformSpec, OUTPUT_EXTENSION};

pub use marker::IdentityMarker;

/// Where reads of an asset are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Transform identity, or the asset id when served from source.
    pub identity: String,
    pub backing: PathBuf,
    pub derived: bool,
}

impl Resolution {
    pub fn source(asset: &AssetRow) -> Self {
        Self {
            identity: asset.id.to_string(),
            backing: asset.filename.clone(),
            derived: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub generated: u64,
    pub reused: u64,
    pub failed: u64,
}

pub struct DerivedAssetCache {
    dir: PathBuf,
    marker: IdentityMarker,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    generated: AtomicU64,
    reused: AtomicU64,
    failed: AtomicU64,
}

impl DerivedAssetCache {
    pub fn new(dir: PathBuf, marker: IdentityMarker) -> Self {
        Self {
            dir,
            marker,
            locks: Mutex::new(HashMap::new()),
            generated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache_path(&self, asset_id: i64) -> PathBuf {
        self.dir.join(format!("{}.{}", asset_id, OUTPUT_EXTENSION))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generated: self.generated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolve the backing file for `asset`, falling back to the source file
    /// on any failure.
    pub fn resolve(&self, asset: &AssetRow) -> Resolution {
        match self.try_resolve(asset) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    asset_id = asset.id,
                    source = ?asset.filename,
                    error = %e,
                    "Serving untransformed source"
                );
                Resolution::source(asset)
            }
        }
    }

    pub fn try_resolve(&self, asset: &AssetRow) -> Result<Resolution> {
        let Some(descriptor) = asset.transformations.as_deref() else {
            return Ok(Resolution::source(asset));
        };
        let spec = TransformSpec::parse(descriptor)?;
        let Some(identity) = spec.identity(asset.id) else {
            return Ok(Resolution::source(asset));
        };

        let path = self.cache_path(asset.id);
        let resolution = Resolution {
            identity: identity.clone(),
            backing: path.clone(),
            derived: true,
        };

        if self.is_valid(&path, &identity) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(resolution);
        }

        let lock = self.lock_for(asset.id);
        let outcome = {
            let _guard = lock.lock();
            // another caller may have finished while we waited
            if self.is_valid(&path, &identity) {
                self.reused.fetch_add(1, Ordering::Relaxed);
                Ok(())
            } else {
                self.generate(asset, &spec, &identity, &path)
            }
        };
        self.release_lock(asset.id, lock);

        outcome.map(|()| resolution)
    }

    pub fn is_valid(&self, path: &Path, identity: &str) -> bool {
        path.is_file() && self.marker.read(path).as_deref() == Some(identity)
    }

    fn lock_for(&self, asset_id: i64) -> Arc<Mutex<()>> {
        self.locks.lock().entry(asset_id).or_default().clone()
    }

    /// Forget the lock for `asset_id` once nobody else holds or waits on it.
    fn release_lock(&self, asset_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        let idle = locks
            .get(&asset_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(&asset_id);
        }
    }

    fn ensure_cache_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|source| Error::CacheWriteFailure {
                path: self.dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn generate(&self, asset: &AssetRow, spec: &TransformSpec, identity: &str, path: &Path) -> Result<()> {
        tracing::info!(
            asset_id = asset.id,
            source = ?asset.filename,
            target = ?path,
            identity,
            "Generating transform: {}",
            spec
        );

        let source = fs::read(&asset.filename).map_err(|e| Error::SourceUnavailable {
            path: asset.filename.clone(),
            reason: e.to_string(),
        })?;
        let output = spec.apply(&source)?;

        self.ensure_cache_dir()?;
        let write_failure = |source: std::io::Error| Error::CacheWriteFailure {
            path: path.to_path_buf(),
            source,
        };

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_failure)?;
        temp.write_all(&output).map_err(write_failure)?;
        temp.as_file().sync_all().map_err(write_failure)?;
        if self.marker.follows_rename() {
            self.marker.write(temp.path(), identity).map_err(write_failure)?;
        }
        temp.persist(path).map_err(|e| write_failure(e.error))?;
        if !self.marker.follows_rename() {
            self.marker.write(path, identity).map_err(write_failure)?;
        }

        self.generated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
