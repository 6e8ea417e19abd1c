//! Ordered mount table resolving resource filenames to byte streams.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{Archive, ARCHIVE_EXTENSION};
use crate::file::ResourceFile;
use crate::path::ResourcePath;
use crate::Error;

/// A registered origin from which filenames are resolved.
#[derive(Debug)]
enum MountPoint {
    /// Files under a directory root.
    Directory { root: PathBuf },
    /// Files inside an `.ankizip` archive.
    Archive { archive: Archive },
}

/// The resource filesystem: an ordered set of mount points.
///
/// Mounts are searched in insertion order and the first hit wins, so earlier
/// mounts shadow later ones. The table is append-only and is frozen before
/// any concurrent use; afterwards the filesystem is immutable and freely
/// shared across threads.
///
/// ```ignore
/// let mut fs = ResourceFilesystem::new();
/// fs.mount("assets")?;
/// fs.mount("assets.ankizip")?;
/// fs.freeze();
/// let mut file = fs.open("subdir0/hello.txt")?;
/// ```
#[derive(Debug, Default)]
pub struct ResourceFilesystem {
    mounts: Vec<MountPoint>,
    frozen: bool,
}

impl ResourceFilesystem {
    pub fn new() -> ResourceFilesystem {
        ResourceFilesystem::default()
    }

    /// Append a mount point.
    ///
    /// A path ending in `.ankizip` mounts as an archive and its index is
    /// parsed eagerly; any other path mounts as a directory root, which must
    /// exist.
    ///
    /// # Panics
    /// * If the filesystem was already frozen.
    pub fn mount(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        assert!(
            !self.frozen,
            "programming error, mount points are fixed after freeze"
        );
        let path = path.as_ref();

        let is_archive = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
        let mount = if is_archive {
            MountPoint::Archive {
                archive: Archive::open(path)?,
            }
        } else {
            if !path.is_dir() {
                return Err(Error::NotFound(path.display().to_string()));
            }
            tracing::debug!(root = %path.display(), "mounted directory");
            MountPoint::Directory {
                root: path.to_path_buf(),
            }
        };
        self.mounts.push(mount);
        Ok(())
    }

    /// Seal the mount table. Later [`ResourceFilesystem::mount`] calls panic.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    /// Resolve `filename` against the mount table and open a fresh stream.
    pub fn open(&self, filename: &str) -> Result<ResourceFile, Error> {
        let path = ResourcePath::new(filename)?;

        for mount in &self.mounts {
            match mount {
                MountPoint::Directory { root } => {
                    let mut candidate = root.clone();
                    candidate.extend(path.components());
                    if candidate.is_file() {
                        let file = fs::File::open(&candidate)?;
                        return ResourceFile::from_disk(file);
                    }
                }
                MountPoint::Archive { archive } => {
                    if archive.entry(path.as_str()).is_some() {
                        return archive.open_entry(path.as_str());
                    }
                }
            }
        }

        Err(Error::NotFound(path.as_str().to_owned()))
    }

    /// Visit every file under `prefix` in directory mounts, in mount order.
    ///
    /// The visitor receives interior forward-slash paths, the same form
    /// [`ResourceFilesystem::open`] accepts. An empty prefix visits
    /// everything; archive mounts are not walked.
    pub fn walk(&self, prefix: &str, mut visitor: impl FnMut(&str)) -> Result<(), Error> {
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(ResourcePath::new(prefix)?)
        };

        for mount in &self.mounts {
            let MountPoint::Directory { root } = mount else {
                continue;
            };
            walk_directory(root, "", &prefix, &mut visitor)?;
        }
        Ok(())
    }
}

fn walk_directory(
    dir: &Path,
    interior: &str,
    prefix: &Option<ResourcePath>,
    visitor: &mut impl FnMut(&str),
) -> Result<(), Error> {
    // Deterministic traversal order regardless of the underlying readdir.
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::warn!(?name, "skipping non-UTF-8 directory entry");
            continue;
        };
        let child_interior = if interior.is_empty() {
            name.to_owned()
        } else {
            format!("{interior}/{name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_directory(&entry.path(), &child_interior, prefix, visitor)?;
        } else if file_type.is_file() && matches_prefix(&child_interior, prefix) {
            visitor(&child_interior);
        }
    }
    Ok(())
}

fn matches_prefix(interior: &str, prefix: &Option<ResourcePath>) -> bool {
    match prefix {
        None => true,
        Some(prefix) => {
            let prefix = prefix.as_str();
            interior == prefix
                || (interior.starts_with(prefix)
                    && interior.as_bytes().get(prefix.len()) == Some(&b'/'))
        }
    }
}
