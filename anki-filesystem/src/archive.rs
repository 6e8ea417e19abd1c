//! The `.ankizip` archive container.
//!
//! An archive is a prelude (magic + version + entry count), a table of
//! entries, then the payloads. The table records everything needed to serve
//! reads, so mounting an archive never streams the payloads:
//!
//! ```text
//! magic    [u8; 8]   "ANKIZIP\0"
//! version  u32
//! count    u32
//! entries  count * { path_len u16, path [u8], codec u8,
//!                    uncompressed_size u64, compressed_size u64, offset u64 }
//! payloads ...
//! ```
//!
//! All integers are little endian; offsets are absolute from the start of the
//! archive file.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::file::ResourceFile;
use crate::path::ResourcePath;
use crate::Error;

pub const ARCHIVE_MAGIC: [u8; 8] = *b"ANKIZIP\0";
pub const ARCHIVE_VERSION: u32 = 1;
/// File extension that marks a mount path as an archive.
pub const ARCHIVE_EXTENSION: &str = "ankizip";

/// How an entry's payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Identity; the payload is the file's bytes.
    Store,
    /// Raw deflate stream.
    Deflate,
}

impl Codec {
    pub fn id(self) -> u8 {
        match self {
            Codec::Store => 0,
            Codec::Deflate => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Codec> {
        match id {
            0 => Some(Codec::Store),
            1 => Some(Codec::Deflate),
            _ => None,
        }
    }
}

/// Index record for one interior file.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntry {
    pub codec: Codec,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    /// Absolute payload offset from the start of the archive file.
    pub offset: u64,
}

/// An opened archive: the backing path plus the fully parsed entry index.
///
/// Opening an archive parses the index eagerly; serving a read later opens a
/// fresh handle on the backing file, so one [`Archive`] can hand out any
/// number of independent [`ResourceFile`]s.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    index: HashMap<String, ArchiveEntry>,
}

impl Archive {
    /// Open `path` and parse its entry index.
    pub fn open(path: impl Into<PathBuf>) -> Result<Archive, Error> {
        let path = path.into();
        let file = fs::File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let index = parse_index(&mut reader, file_len)?;
        tracing::debug!(path = %path.display(), entries = index.len(), "opened archive");

        Ok(Archive { path, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, interior_path: &str) -> Option<&ArchiveEntry> {
        self.index.get(interior_path)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ArchiveEntry)> {
        self.index.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Open a fresh readable stream over one interior file.
    pub fn open_entry(&self, interior_path: &str) -> Result<ResourceFile, Error> {
        let entry = self
            .index
            .get(interior_path)
            .ok_or_else(|| Error::NotFound(interior_path.to_owned()))?;
        let file = fs::File::open(&self.path)?;
        ResourceFile::from_archive(file, *entry)
    }
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptArchive {
        reason: reason.into(),
    }
}

/// Maps a short read while parsing the index to [`Error::CorruptArchive`];
/// anything else is a real I/O failure.
fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        corrupt("truncated index")
    } else {
        Error::Io(err)
    }
}

fn parse_index(
    reader: &mut impl Read,
    file_len: u64,
) -> Result<HashMap<String, ArchiveEntry>, Error> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(truncated)?;
    if magic != ARCHIVE_MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if version != ARCHIVE_VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut index = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let path_len = reader.read_u16::<LittleEndian>().map_err(truncated)?;
        let mut path_bytes = vec![0u8; path_len as usize];
        reader.read_exact(&mut path_bytes).map_err(truncated)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| corrupt("entry path is not valid UTF-8"))?;

        let codec_id = reader.read_u8().map_err(truncated)?;
        let codec = Codec::from_id(codec_id)
            .ok_or_else(|| corrupt(format!("unknown codec id {codec_id}")))?;
        let uncompressed_size = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let compressed_size = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let offset = reader.read_u64::<LittleEndian>().map_err(truncated)?;

        if codec == Codec::Store && compressed_size != uncompressed_size {
            return Err(corrupt(format!("stored entry '{path}' has mismatched sizes")));
        }
        let end = offset
            .checked_add(compressed_size)
            .ok_or_else(|| corrupt("entry offset overflow"))?;
        if end > file_len {
            return Err(corrupt(format!("entry '{path}' payload is out of bounds")));
        }

        let entry = ArchiveEntry {
            codec,
            uncompressed_size,
            compressed_size,
            offset,
        };
        if index.insert(path.clone(), entry).is_some() {
            return Err(corrupt(format!("duplicate entry '{path}'")));
        }
    }

    Ok(index)
}

/// Builds `.ankizip` archives; the counterpart of [`Archive`].
///
/// Payloads are buffered (and compressed) as they are added, then laid out in
/// one pass by [`ArchiveWriter::write_to`].
#[derive(Default)]
pub struct ArchiveWriter {
    entries: Vec<PendingEntry>,
}

struct PendingEntry {
    path: String,
    codec: Codec,
    uncompressed_size: u64,
    payload: Vec<u8>,
}

impl ArchiveWriter {
    pub fn new() -> ArchiveWriter {
        ArchiveWriter::default()
    }

    /// Add one interior file. The path is canonicalised.
    ///
    /// # Panics
    /// * If an entry with the same canonical path was already added.
    pub fn add(&mut self, interior_path: &str, bytes: &[u8], codec: Codec) -> Result<(), Error> {
        let path = ResourcePath::new(interior_path)?.as_str().to_owned();
        assert!(
            self.entries.iter().all(|entry| entry.path != path),
            "duplicate archive entry '{path}'"
        );

        let payload = match codec {
            Codec::Store => bytes.to_vec(),
            Codec::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(bytes)?;
                encoder.finish()?
            }
        };
        self.entries.push(PendingEntry {
            path,
            codec,
            uncompressed_size: bytes.len() as u64,
            payload,
        });
        Ok(())
    }

    /// Serialise the archive into `writer`.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), Error> {
        // Prelude + table sizes are fixed once the entries are known, so
        // payload offsets can be assigned up front.
        let table_len: u64 = self
            .entries
            .iter()
            .map(|entry| 2 + entry.path.len() as u64 + 1 + 8 * 3)
            .sum();
        let mut offset = 8 + 4 + 4 + table_len;

        writer.write_all(&ARCHIVE_MAGIC)?;
        writer.write_u32::<LittleEndian>(ARCHIVE_VERSION)?;
        writer.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for entry in &self.entries {
            writer.write_u16::<LittleEndian>(entry.path.len() as u16)?;
            writer.write_all(entry.path.as_bytes())?;
            writer.write_u8(entry.codec.id())?;
            writer.write_u64::<LittleEndian>(entry.uncompressed_size)?;
            writer.write_u64::<LittleEndian>(entry.payload.len() as u64)?;
            writer.write_u64::<LittleEndian>(offset)?;
            offset += entry.payload.len() as u64;
        }
        for entry in &self.entries {
            writer.write_all(&entry.payload)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Serialise the archive to a file at `path`.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut file = fs::File::create(path)?;
        self.write_to(&mut file)?;
        file.sync_all()?;
        Ok(())
    }
}
