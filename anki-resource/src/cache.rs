//! Name-keyed, deduplicating cache of assets of a single kind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use anki_filesystem::path::ResourcePath;

use crate::asset::{Asset, AssetKind, Handle, LoadState};
use crate::async_loader::{LoaderTask, TaskContext};
use crate::manager::LoadContext;
use crate::Error;

const POISON: &str = "resource cache state poisoned";

/// Map shared between the cache and the eviction path of its assets.
///
/// Entries are weak so the map itself never keeps an asset alive; the strong
/// references all live in handles. Every 0↔1 refcount transition is mediated
/// by the map lock: a lookup upgrades under the lock, and the final handle
/// drop evicts under the lock with a pointer-identity check so it can never
/// remove a newer asset that reused the name.
pub(crate) struct CacheShared<T: AssetKind> {
    entries: Mutex<HashMap<String, Weak<Asset<T>>>>,
}

impl<T: AssetKind> CacheShared<T> {
    pub(crate) fn evict(&self, asset: &Asset<T>) {
        let mut entries = self.entries.lock().expect(POISON);
        if let Some(stored) = entries.get(asset.name().as_str()) {
            if std::ptr::eq(stored.as_ptr(), asset) {
                entries.remove(asset.name().as_str());
            }
        }
    }

    /// Remove `asset`'s entry if it is still the registered instance. Used
    /// when a load fails before the asset ever becomes shareable.
    fn remove_placeholder(&self, asset: &Arc<Asset<T>>) {
        let mut entries = self.entries.lock().expect(POISON);
        if let Some(stored) = entries.get(asset.name().as_str()) {
            if std::ptr::eq(stored.as_ptr(), Arc::as_ptr(asset)) {
                entries.remove(asset.name().as_str());
            }
        }
    }
}

impl<T: AssetKind> Drop for CacheShared<T> {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().expect(POISON);
        for (name, entry) in entries.iter() {
            if entry.strong_count() > 0 {
                tracing::warn!(kind = T::KIND, name = %name, "asset outlives its cache");
            }
        }
    }
}

/// Deduplicating registry of all live assets of kind `T`.
pub struct ResourceCache<T: AssetKind> {
    shared: Arc<CacheShared<T>>,
}

impl<T: AssetKind> Default for ResourceCache<T> {
    fn default() -> ResourceCache<T> {
        ResourceCache {
            shared: Arc::new(CacheShared {
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T: AssetKind> ResourceCache<T> {
    pub fn new() -> ResourceCache<T> {
        ResourceCache::default()
    }

    /// Number of assets currently alive in this cache.
    pub fn live_count(&self) -> usize {
        // The upgraded temporaries must outlive the lock guard: if one of
        // them turned out to be the last strong reference, dropping it would
        // re-enter the eviction path and this mutex.
        let live: Vec<Arc<Asset<T>>> = {
            let entries = self.shared.entries.lock().expect(POISON);
            entries.values().filter_map(Weak::upgrade).collect()
        };
        live.len()
    }

    /// Load (or share) the asset named `name`.
    ///
    /// A cache hit returns a fresh handle to the existing asset, in whatever
    /// load state it is in. A miss registers a placeholder, decodes the
    /// header synchronously, submits the body decode to the loader, and
    /// returns a handle that becomes ready (or failed) later. The cache lock
    /// is never held across I/O or the loader submission.
    pub fn load(&self, name: &str, ctx: &LoadContext) -> Result<Handle<T>, Error> {
        let path = ResourcePath::new(name)?;

        let asset = {
            let mut entries = self.shared.entries.lock().expect(POISON);
            if let Some(existing) = entries.get(path.as_str()).and_then(Weak::upgrade) {
                tracing::trace!(kind = T::KIND, name = %path, "cache hit");
                return Ok(Handle::new(existing));
            }
            let asset = Arc::new(Asset::new(path.clone(), Arc::downgrade(&self.shared)));
            entries.insert(path.as_str().to_owned(), Arc::downgrade(&asset));
            asset
        };

        match self.decode_header_and_enqueue(&asset, ctx) {
            Ok(()) => Ok(Handle::new(asset)),
            Err(err) => {
                tracing::warn!(kind = T::KIND, name = %path, %err, "load failed");
                asset.set_state(LoadState::Failed);
                self.shared.remove_placeholder(&asset);
                Err(err)
            }
        }
    }

    fn decode_header_and_enqueue(&self, asset: &Arc<Asset<T>>, ctx: &LoadContext) -> Result<(), Error> {
        let name = asset.name().as_str();
        let mut file = ctx.filesystem().open(name)?;
        let header = T::decode_header(&mut file, name, ctx)?;
        asset.install_header(header);
        asset.set_state(LoadState::Decoding);

        ctx.loader().submit(BodyDecodeTask {
            handle: Handle::new(Arc::clone(asset)),
            ctx: ctx.clone(),
        })?;
        tracing::debug!(kind = T::KIND, name, uuid = %asset.uuid(), "header decoded, body queued");
        Ok(())
    }
}

/// Loader task that decodes an asset's body and flips its final state.
///
/// Holds a handle, so an asset never dies while its body decode is queued or
/// running; if every consumer gave up in the meantime, the asset is destroyed
/// right here on the worker when the task is dropped.
struct BodyDecodeTask<T: AssetKind> {
    handle: Handle<T>,
    ctx: LoadContext,
}

impl<T: AssetKind> LoaderTask for BodyDecodeTask<T> {
    fn run(&mut self, _task_ctx: &mut TaskContext) -> Result<(), Error> {
        let name = self.handle.name().as_str().to_owned();
        let result: Result<T::Body, Error> = (|| {
            // A fresh stream per consumer; the header decode's stream is gone.
            let mut file = self.ctx.filesystem().open(&name)?;
            let header = self
                .handle
                .header()
                .expect("header decoded before body task was queued");
            let body = T::decode_body(header, &mut file, &name, &self.ctx)?;
            Ok(body)
        })();

        match result {
            Ok(body) => {
                self.handle.asset().install_body(body);
                self.handle.asset().set_state(LoadState::Ready);
                tracing::debug!(kind = T::KIND, name = %name, "asset ready");
                Ok(())
            }
            Err(err) => {
                self.handle.asset().set_state(LoadState::Failed);
                Err(err)
            }
        }
    }
}
