//! The resource manager facade and the context handed to decoders.

use std::fs;
use std::sync::Arc;

use anki_filesystem::filesystem::ResourceFilesystem;

use crate::animation::Animation;
use crate::asset::{AssetKind, Handle};
use crate::async_loader::AsyncLoader;
use crate::backend::Backend;
use crate::cache::ResourceCache;
use crate::dummy::Dummy;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::program::Program;
use crate::settings::ResourceSettings;
use crate::texture::Texture;
use crate::Error;

/// One cache per registered asset kind.
///
/// NOTE: when adding an asset kind, add its cache here and implement
/// [`ManagedAsset`] for it below.
#[derive(Default)]
pub struct CacheSet {
    animations: ResourceCache<Animation>,
    dummies: ResourceCache<Dummy>,
    materials: ResourceCache<Material>,
    meshes: ResourceCache<Mesh>,
    programs: ResourceCache<Program>,
    textures: ResourceCache<Texture>,
}

/// Asset kinds the manager knows how to cache.
pub trait ManagedAsset: AssetKind {
    fn cache(caches: &CacheSet) -> &ResourceCache<Self>;
}

macro_rules! managed_asset {
    ($kind:ty, $field:ident) => {
        impl ManagedAsset for $kind {
            fn cache(caches: &CacheSet) -> &ResourceCache<$kind> {
                &caches.$field
            }
        }
    };
}

managed_asset!(Animation, animations);
managed_asset!(Dummy, dummies);
managed_asset!(Material, materials);
managed_asset!(Mesh, meshes);
managed_asset!(Program, programs);
managed_asset!(Texture, textures);

/// Everything a decoder may need while loading, passed explicitly instead of
/// living in process-wide singletons.
///
/// Cloning is cheap; body-decode tasks carry a clone onto the loader worker.
/// Composite kinds use [`LoadContext::load`] to pull in the leaf assets they
/// reference.
#[derive(Clone)]
pub struct LoadContext {
    filesystem: Arc<ResourceFilesystem>,
    loader: Arc<AsyncLoader>,
    backend: Arc<dyn Backend>,
    settings: Arc<ResourceSettings>,
    caches: Arc<CacheSet>,
}

impl LoadContext {
    pub fn filesystem(&self) -> &ResourceFilesystem {
        &self.filesystem
    }

    pub fn loader(&self) -> &AsyncLoader {
        &self.loader
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    /// Load (or share) an asset through the kind's cache.
    pub fn load<T: ManagedAsset>(&self, name: &str) -> Result<Handle<T>, Error> {
        T::cache(&self.caches).load(name, self)
    }

    /// Number of live assets of kind `T`.
    pub fn live_count<T: ManagedAsset>(&self) -> usize {
        T::cache(&self.caches).live_count()
    }
}

/// Construction parameters for [`ResourceManager`].
pub struct ResourceManagerInit {
    pub settings: ResourceSettings,
    pub backend: Arc<dyn Backend>,
}

impl ResourceManagerInit {
    pub fn new(settings: ResourceSettings, backend: Arc<dyn Backend>) -> ResourceManagerInit {
        ResourceManagerInit { settings, backend }
    }
}

/// Owner of the whole pipeline: filesystem, loader, and one cache per kind.
///
/// ```ignore
/// let manager = ResourceManager::new(ResourceManagerInit::new(settings, backend))?;
/// let texture = manager.load::<Texture>("textures/crate.tga")?;
/// while !texture.is_ready() && !texture.is_failed() { /* tick */ }
/// ```
pub struct ResourceManager {
    ctx: LoadContext,
}

impl ResourceManager {
    pub fn new(init: ResourceManagerInit) -> Result<ResourceManager, Error> {
        let settings = init.settings;

        let mut filesystem = ResourceFilesystem::new();
        for path in &settings.mount_paths {
            filesystem.mount(path)?;
        }
        filesystem.freeze();

        fs::create_dir_all(&settings.cache_dir).map_err(anki_filesystem::Error::Io)?;

        let ctx = LoadContext {
            filesystem: Arc::new(filesystem),
            loader: Arc::new(AsyncLoader::start()),
            backend: init.backend,
            settings: Arc::new(settings),
            caches: Arc::new(CacheSet::default()),
        };
        tracing::info!(
            mounts = ctx.filesystem.mount_count(),
            cache_dir = %ctx.settings.cache_dir.display(),
            "resource manager ready"
        );
        Ok(ResourceManager { ctx })
    }

    /// Load (or share) the asset named `name`.
    pub fn load<T: ManagedAsset>(&self, name: &str) -> Result<Handle<T>, Error> {
        self.ctx.load(name)
    }

    /// The context decoders run with; useful for embedding code that loads
    /// assets from outside the manager.
    pub fn context(&self) -> &LoadContext {
        &self.ctx
    }

    pub fn filesystem(&self) -> &ResourceFilesystem {
        self.ctx.filesystem()
    }

    pub fn loader(&self) -> &AsyncLoader {
        self.ctx.loader()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.ctx.backend()
    }

    pub fn settings(&self) -> &ResourceSettings {
        self.ctx.settings()
    }

    /// Number of live assets of kind `T`.
    pub fn live_count<T: ManagedAsset>(&self) -> usize {
        self.ctx.live_count::<T>()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        // In-flight body tasks hold context clones, so the loader must be
        // stopped here rather than waiting for its own (possibly never
        // reached) drop.
        let _ = self.ctx.loader.stop();
    }
}
