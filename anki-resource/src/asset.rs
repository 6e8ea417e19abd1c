//! The asset object model: kinds, cached assets, and refcounted handles.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use anki_filesystem::file::ResourceFile;
use anki_filesystem::path::ResourcePath;
use uuid::Uuid;

use crate::cache::CacheShared;
use crate::manager::LoadContext;
use crate::Error;

/// Where an asset is in its life.
///
/// ```text
/// Header --[body task enqueued]--> Decoding --ok--> Ready
///                                           --err-> Failed
/// ```
///
/// The refcount reaching zero destroys the asset from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadState {
    /// Placeholder registered; header decode in progress.
    Header = 0,
    /// Header decoded; body decode queued or running on the loader.
    Decoding = 1,
    Ready = 2,
    Failed = 3,
}

impl LoadState {
    fn from_u8(value: u8) -> LoadState {
        match value {
            0 => LoadState::Header,
            1 => LoadState::Decoding,
            2 => LoadState::Ready,
            3 => LoadState::Failed,
            other => unreachable!("invalid load state {other}"),
        }
    }
}

/// Capability trait implemented once per asset kind.
///
/// The header decode runs synchronously on the loading thread and is where a
/// kind validates metadata and pre-allocates backend slots; the body decode
/// runs later on the loader worker. Destruction is plain `Drop` on the
/// payload types (a GPU-backed header owns a `BackendSlot` guard).
pub trait AssetKind: Send + Sync + Sized + 'static {
    /// Kind name used in logs and error messages.
    const KIND: &'static str;

    type Header: Send + Sync + 'static;
    type Body: Send + Sync + 'static;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        ctx: &LoadContext,
    ) -> Result<Self::Header, Error>;

    fn decode_body(
        header: &Self::Header,
        file: &mut ResourceFile,
        name: &str,
        ctx: &LoadContext,
    ) -> Result<Self::Body, Error>;
}

/// One cached asset. At most one exists per (kind, filename) at any instant;
/// handles share it and the last handle drop destroys it.
pub struct Asset<T: AssetKind> {
    name: ResourcePath,
    uuid: Uuid,
    state: AtomicU8,
    header: OnceLock<T::Header>,
    body: OnceLock<T::Body>,
    /// Back-reference used by the eviction path. A dead weak (the manager
    /// went away first) makes eviction a no-op.
    cache: Weak<CacheShared<T>>,
}

impl<T: AssetKind> Asset<T> {
    pub(crate) fn new(name: ResourcePath, cache: Weak<CacheShared<T>>) -> Asset<T> {
        Asset {
            name,
            uuid: Uuid::new_v4(),
            state: AtomicU8::new(LoadState::Header as u8),
            header: OnceLock::new(),
            body: OnceLock::new(),
            cache,
        }
    }

    pub fn name(&self) -> &ResourcePath {
        &self.name
    }

    /// Unique identity of this asset instance, for diagnostics.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: LoadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn header(&self) -> Option<&T::Header> {
        self.header.get()
    }

    /// The decoded body; `Some` iff the asset is [`LoadState::Ready`].
    pub fn body(&self) -> Option<&T::Body> {
        if self.state() == LoadState::Ready {
            self.body.get()
        } else {
            None
        }
    }

    pub(crate) fn install_header(&self, header: T::Header) {
        if self.header.set(header).is_err() {
            unreachable!("header decoded twice for '{}'", self.name);
        }
    }

    pub(crate) fn install_body(&self, body: T::Body) {
        if self.body.set(body).is_err() {
            unreachable!("body decoded twice for '{}'", self.name);
        }
    }
}

impl<T: AssetKind> Drop for Asset<T> {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.evict(self);
        }
        tracing::trace!(kind = T::KIND, name = %self.name, uuid = %self.uuid, "destroying asset");
    }
}

impl<T: AssetKind> fmt::Debug for Asset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("kind", &T::KIND)
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Refcounted reference to an [`Asset`].
///
/// Cloning bumps the shared count, dropping decrements it, and the last drop
/// evicts the asset from its cache and destroys it. Handles are movable and
/// cloneable, never implicitly copyable.
pub struct Handle<T: AssetKind> {
    asset: Arc<Asset<T>>,
}

impl<T: AssetKind> Handle<T> {
    pub(crate) fn new(asset: Arc<Asset<T>>) -> Handle<T> {
        Handle { asset }
    }

    pub(crate) fn asset(&self) -> &Asset<T> {
        &self.asset
    }

    pub fn name(&self) -> &ResourcePath {
        self.asset.name()
    }

    pub fn uuid(&self) -> Uuid {
        self.asset.uuid()
    }

    pub fn state(&self) -> LoadState {
        self.asset.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state() == LoadState::Failed
    }

    pub fn header(&self) -> Option<&T::Header> {
        self.asset.header()
    }

    pub fn body(&self) -> Option<&T::Body> {
        self.asset.body()
    }

    /// Whether two handles reference the same underlying asset instance.
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Arc::ptr_eq(&self.asset, &other.asset)
    }

    /// Number of live handles sharing this asset (the body-decode task holds
    /// one while it runs).
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.asset)
    }
}

impl<T: AssetKind> Clone for Handle<T> {
    fn clone(&self) -> Handle<T> {
        Handle {
            asset: Arc::clone(&self.asset),
        }
    }
}

impl<T: AssetKind> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.asset, f)
    }
}
