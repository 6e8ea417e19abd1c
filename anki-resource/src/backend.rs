//! Invocation boundary towards the GPU/physics side.
//!
//! The pipeline itself never talks to a device; asset decoders pre-allocate
//! slots while decoding headers and push bytes into them from the loader
//! worker. Everything behind [`Backend`] is out of scope here and supplied by
//! the embedding engine. [`NullBackend`] is the accounting-only stand-in used
//! by tests and headless runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::Error;

/// Opaque identifier of an allocated backend slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// What an allocated slot backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Texture,
    Mesh,
}

/// Narrow contract to the GPU/physics consumer.
///
/// Implementations must be callable from any thread: allocation happens on
/// whatever thread decodes a header, uploads happen on the loader worker, and
/// releases happen on whichever thread drops the last handle.
pub trait Backend: Send + Sync + 'static {
    /// Reserve a slot of `size_bytes`. May fail with
    /// [`Error::BackendRejected`].
    fn allocate(&self, kind: SlotKind, size_bytes: u64) -> Result<SlotId, Error>;

    /// Push payload bytes into a previously allocated slot.
    fn upload(&self, slot: SlotId, bytes: &[u8]) -> Result<(), Error>;

    /// Return a slot to the backend. Infallible by contract; backends queue
    /// deferred destruction internally if they need to.
    fn release(&self, slot: SlotId);
}

/// RAII guard for one allocated slot; dropping it releases the slot on
/// whichever thread the drop happens.
pub struct BackendSlot {
    backend: Arc<dyn Backend>,
    id: SlotId,
    kind: SlotKind,
}

impl BackendSlot {
    pub fn allocate(
        backend: Arc<dyn Backend>,
        kind: SlotKind,
        size_bytes: u64,
    ) -> Result<BackendSlot, Error> {
        let id = backend.allocate(kind, size_bytes)?;
        Ok(BackendSlot { backend, id, kind })
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn upload(&self, bytes: &[u8]) -> Result<(), Error> {
        self.backend.upload(self.id, bytes)
    }
}

impl Drop for BackendSlot {
    fn drop(&mut self) {
        self.backend.release(self.id);
    }
}

impl fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotInfo {
    kind: SlotKind,
    size_bytes: u64,
}

/// Backend that only keeps the books.
#[derive(Debug, Default)]
pub struct NullBackend {
    next_slot: AtomicU64,
    live: Mutex<HashMap<SlotId, SlotInfo>>,
    uploads: AtomicU64,
}

impl NullBackend {
    pub fn new() -> NullBackend {
        NullBackend::default()
    }

    /// Number of slots currently allocated and not yet released.
    pub fn live_slots(&self) -> usize {
        self.live.lock().expect("backend state poisoned").len()
    }

    /// Total number of successful uploads.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Acquire)
    }
}

impl Backend for NullBackend {
    fn allocate(&self, kind: SlotKind, size_bytes: u64) -> Result<SlotId, Error> {
        let id = SlotId(self.next_slot.fetch_add(1, Ordering::Relaxed));
        self.live
            .lock()
            .expect("backend state poisoned")
            .insert(id, SlotInfo { kind, size_bytes });
        Ok(id)
    }

    fn upload(&self, slot: SlotId, bytes: &[u8]) -> Result<(), Error> {
        let live = self.live.lock().expect("backend state poisoned");
        let Some(info) = live.get(&slot) else {
            return Err(Error::BackendRejected {
                reason: format!("upload to unknown {slot}"),
            });
        };
        if bytes.len() as u64 > info.size_bytes {
            return Err(Error::BackendRejected {
                reason: format!(
                    "upload of {} bytes exceeds the {} bytes reserved for {slot}",
                    bytes.len(),
                    info.size_bytes
                ),
            });
        }
        self.uploads.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn release(&self, slot: SlotId) {
        let removed = self.live.lock().expect("backend state poisoned").remove(&slot);
        if removed.is_none() {
            tracing::warn!(%slot, "released a slot that was never allocated");
        }
    }
}
