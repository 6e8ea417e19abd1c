//! Asynchronous resource pipeline.
//!
//! The pieces compose as follows: a [`manager::ResourceManager`] owns one
//! [`cache::ResourceCache`] per asset kind, the shared
//! [`anki_filesystem::filesystem::ResourceFilesystem`], and the
//! [`async_loader::AsyncLoader`]. Loading an asset deduplicates against the
//! kind's cache, decodes the header synchronously, and hands the body decode
//! to the loader's background worker; the returned [`asset::Handle`] can be
//! polled for readiness and shares the one underlying asset per filename.

pub mod animation;
pub mod asset;
pub mod async_loader;
pub mod backend;
pub mod cache;
pub mod dummy;
pub mod manager;
pub mod material;
pub mod mesh;
pub mod program;
pub mod settings;
pub mod texture;


use asset::Handle;

/// Errors that can be returned from the resource pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Filesystem(#[from] anki_filesystem::Error),
    #[error("failed to decode {kind} '{name}': {reason}")]
    DecodeFailed {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("backend rejected request: {reason}")]
    BackendRejected { reason: String },
    #[error("async loader was already stopped")]
    AlreadyStopped,
    #[error("async loader is stopped")]
    Stopped,
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Decode failure for an asset of kind `T`.
    pub(crate) fn decode<T: asset::AssetKind>(name: &str, reason: impl Into<String>) -> Error {
        Error::DecodeFailed {
            kind: T::KIND,
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

// NOTE: when adding an asset kind, also register it in `manager::CacheSet`
// and implement `manager::ManagedAsset` for it.
pub type AnimationHandle = Handle<animation::Animation>;
pub type DummyHandle = Handle<dummy::Dummy>;
pub type MaterialHandle = Handle<material::Material>;
pub type MeshHandle = Handle<mesh::Mesh>;
pub type ProgramHandle = Handle<program::Program>;
pub type TextureHandle = Handle<texture::Texture>;
